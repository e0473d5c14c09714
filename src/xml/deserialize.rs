//! XML request deserialization for Azure Blob Storage API.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{
    AccessPolicy, CorsRule, LoggingConfig, MetricsConfig, RetentionPolicy, ServiceProperties,
    SignedIdentifier, StaticWebsite,
};

/// Maximum number of stored access policies per container.
pub const MAX_SIGNED_IDENTIFIERS: usize = 5;

fn invalid_xml() -> StorageError {
    StorageError::new(ErrorCode::InvalidXmlDocument)
}

fn parse_bool(text: &str) -> bool {
    text.eq_ignore_ascii_case("true")
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Element names are matched as sent, except `cors` which some clients
/// send lowercased.
fn element_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    if name.eq_ignore_ascii_case("cors") {
        "Cors".to_string()
    } else {
        name.into_owned()
    }
}

/// Parses service properties XML.
///
/// Sections absent from the body stay `None` so a merge leaves them
/// unchanged. `<Cors/>` and `<Cors></Cors>` both produce an empty rule list.
pub fn parse_service_properties(xml: &str) -> StorageResult<ServiceProperties> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut props = ServiceProperties::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut logging = LoggingConfig::default();
    let mut hour_metrics = MetricsConfig::default();
    let mut minute_metrics = MetricsConfig::default();
    let mut retention = RetentionPolicy::default();
    let mut cors_rules: Vec<CorsRule> = Vec::new();
    let mut rule = CorsRule::default();
    let mut static_website = StaticWebsite::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(element_name(e.name().as_ref()));
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if path.len() == 1 && element_name(e.name().as_ref()) == "Cors" {
                    props.cors = Some(Vec::new());
                }
            }
            Ok(Event::Text(e)) => {
                text = e.unescape().map_err(|_| invalid_xml())?.into_owned();
            }
            Ok(Event::End(_)) => {
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                match segments.as_slice() {
                    [_, "Logging", "Version"] => logging.version = text.clone(),
                    [_, "Logging", "Read"] => logging.read = parse_bool(&text),
                    [_, "Logging", "Write"] => logging.write = parse_bool(&text),
                    [_, "Logging", "Delete"] => logging.delete = parse_bool(&text),
                    [_, "Logging", "RetentionPolicy"] => {
                        logging.retention_policy = std::mem::take(&mut retention);
                    }
                    [_, "Logging"] => props.logging = Some(std::mem::take(&mut logging)),

                    [_, section @ ("HourMetrics" | "MinuteMetrics"), field] => {
                        let metrics = if *section == "HourMetrics" {
                            &mut hour_metrics
                        } else {
                            &mut minute_metrics
                        };
                        match *field {
                            "Version" => metrics.version = text.clone(),
                            "Enabled" => metrics.enabled = parse_bool(&text),
                            "IncludeAPIs" => metrics.include_apis = Some(parse_bool(&text)),
                            "RetentionPolicy" => {
                                metrics.retention_policy = std::mem::take(&mut retention);
                            }
                            _ => {}
                        }
                    }
                    [_, "HourMetrics"] => {
                        props.hour_metrics = Some(std::mem::take(&mut hour_metrics));
                    }
                    [_, "MinuteMetrics"] => {
                        props.minute_metrics = Some(std::mem::take(&mut minute_metrics));
                    }

                    [_, _, "RetentionPolicy", "Enabled"] => retention.enabled = parse_bool(&text),
                    [_, _, "RetentionPolicy", "Days"] => {
                        retention.days = Some(text.parse().map_err(|_| invalid_xml())?);
                    }

                    [_, "Cors", "CorsRule", field] => match *field {
                        "AllowedOrigins" => rule.allowed_origins = split_list(&text),
                        "AllowedMethods" => rule.allowed_methods = split_list(&text),
                        "AllowedHeaders" => rule.allowed_headers = split_list(&text),
                        "ExposedHeaders" => rule.exposed_headers = split_list(&text),
                        "MaxAgeInSeconds" => {
                            rule.max_age_in_seconds = text.parse().map_err(|_| invalid_xml())?;
                        }
                        _ => {}
                    },
                    [_, "Cors", "CorsRule"] => cors_rules.push(std::mem::take(&mut rule)),
                    [_, "Cors"] => props.cors = Some(std::mem::take(&mut cors_rules)),

                    [_, "DefaultServiceVersion"] => {
                        props.default_service_version = Some(text.clone());
                    }

                    [_, "StaticWebsite", "Enabled"] => static_website.enabled = parse_bool(&text),
                    [_, "StaticWebsite", "IndexDocument"] => {
                        static_website.index_document = Some(text.clone());
                    }
                    [_, "StaticWebsite", "ErrorDocument404Path"] => {
                        static_website.error_document_404_path = Some(text.clone());
                    }
                    [_, "StaticWebsite"] => {
                        props.static_website = Some(std::mem::take(&mut static_website));
                    }
                    _ => {}
                }
                path.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(invalid_xml()),
            _ => {}
        }
        buf.clear();
    }

    Ok(props)
}

fn parse_policy_time(text: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| invalid_xml())
}

/// Parses signed identifiers (access policy) XML, preserving order.
pub fn parse_signed_identifiers(xml: &str) -> StorageResult<Vec<SignedIdentifier>> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut identifiers = Vec::new();
    let mut buf = Vec::new();
    let mut text = String::new();

    let mut id = String::new();
    let mut policy = AccessPolicy::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => text.clear(),
            Ok(Event::Text(e)) => {
                text = e.unescape().map_err(|_| invalid_xml())?.into_owned();
            }
            Ok(Event::End(e)) => {
                match e.name().as_ref() {
                    b"Id" => id = text.clone(),
                    b"Start" if !text.is_empty() => policy.start = Some(parse_policy_time(&text)?),
                    b"Expiry" if !text.is_empty() => {
                        policy.expiry = Some(parse_policy_time(&text)?)
                    }
                    b"Permission" => policy.permission = Some(text.clone()),
                    b"SignedIdentifier" => {
                        if id.is_empty() {
                            return Err(invalid_xml());
                        }
                        identifiers.push(SignedIdentifier {
                            id: std::mem::take(&mut id),
                            access_policy: std::mem::take(&mut policy),
                        });
                    }
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(invalid_xml()),
            _ => {}
        }
        buf.clear();
    }

    if identifiers.len() > MAX_SIGNED_IDENTIFIERS {
        return Err(invalid_xml());
    }
    Ok(identifiers)
}
