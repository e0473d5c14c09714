//! XML response serialization for Azure Blob Storage API.

use crate::context::{format_http_date, format_iso8601};
use crate::error::xml_escape;
use crate::models::{
    BlobModel, ContainerModel, CorsRule, LeaseProperties, LoggingConfig, Metadata,
    MetricsConfig, PublicAccessLevel, RetentionPolicy, ServiceProperties, SignedIdentifier,
};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Serializes a list of containers to XML.
pub fn serialize_container_list(
    service_endpoint: &str,
    containers: &[ContainerModel],
    prefix: Option<&str>,
    marker: Option<&str>,
    max_results: usize,
    next_marker: Option<&str>,
    include_metadata: bool,
) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!(
        r#"<EnumerationResults ServiceEndpoint="{}">"#,
        xml_escape(service_endpoint)
    ));

    if let Some(p) = prefix {
        xml.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(p)));
    }
    if let Some(m) = marker {
        xml.push_str(&format!("<Marker>{}</Marker>", xml_escape(m)));
    }
    xml.push_str(&format!("<MaxResults>{}</MaxResults>", max_results));

    xml.push_str("<Containers>");
    for container in containers {
        xml.push_str(&serialize_container(container, include_metadata));
    }
    xml.push_str("</Containers>");

    xml.push_str(&format!(
        "<NextMarker>{}</NextMarker>",
        xml_escape(next_marker.unwrap_or(""))
    ));
    xml.push_str("</EnumerationResults>");
    xml
}

/// Serializes a single container for list results.
fn serialize_container(container: &ContainerModel, include_metadata: bool) -> String {
    let props = &container.properties;
    let mut xml = String::from("<Container>");
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(&container.name)));
    xml.push_str("<Properties>");
    xml.push_str(&format!(
        "<Last-Modified>{}</Last-Modified>",
        format_http_date(&props.last_modified)
    ));
    xml.push_str(&format!("<Etag>{}</Etag>", xml_escape(&props.etag)));
    xml.push_str(&serialize_lease(&props.lease));
    if props.public_access != PublicAccessLevel::None {
        xml.push_str(&format!(
            "<PublicAccess>{}</PublicAccess>",
            props.public_access.as_str()
        ));
    }
    xml.push_str(&format!(
        "<HasImmutabilityPolicy>{}</HasImmutabilityPolicy>",
        props.has_immutability_policy
    ));
    xml.push_str(&format!(
        "<HasLegalHold>{}</HasLegalHold>",
        props.has_legal_hold
    ));
    xml.push_str("</Properties>");

    if include_metadata {
        xml.push_str(&serialize_metadata(&container.metadata));
    }

    xml.push_str("</Container>");
    xml
}

fn serialize_lease(lease: &LeaseProperties) -> String {
    let mut xml = format!(
        "<LeaseStatus>{}</LeaseStatus><LeaseState>{}</LeaseState>",
        lease.status().as_str(),
        lease.state.as_str()
    );
    if let Some(duration) = lease.reported_duration() {
        xml.push_str(&format!("<LeaseDuration>{}</LeaseDuration>", duration.as_str()));
    }
    xml
}

fn serialize_metadata(metadata: &Metadata) -> String {
    if metadata.is_empty() {
        return "<Metadata />".to_string();
    }
    let mut xml = String::from("<Metadata>");
    for (key, value) in metadata.iter() {
        xml.push_str(&format!(
            "<{}>{}</{}>",
            xml_escape(key),
            xml_escape(value),
            xml_escape(key)
        ));
    }
    xml.push_str("</Metadata>");
    xml
}

/// Everything a blob listing response carries.
#[derive(Debug)]
pub struct BlobListing<'a> {
    pub service_endpoint: &'a str,
    pub container: &'a str,
    pub prefix: Option<&'a str>,
    pub marker: Option<&'a str>,
    pub delimiter: Option<&'a str>,
    pub max_results: usize,
    pub blobs: &'a [BlobModel],
    pub blob_prefixes: &'a [String],
    pub next_marker: Option<&'a str>,
    pub include_metadata: bool,
}

/// Serializes a list of blobs to XML.
pub fn serialize_blob_list(listing: &BlobListing<'_>) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!(
        r#"<EnumerationResults ServiceEndpoint="{}" ContainerName="{}">"#,
        xml_escape(listing.service_endpoint),
        xml_escape(listing.container)
    ));

    if let Some(p) = listing.prefix {
        xml.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(p)));
    }
    if let Some(m) = listing.marker {
        xml.push_str(&format!("<Marker>{}</Marker>", xml_escape(m)));
    }
    xml.push_str(&format!("<MaxResults>{}</MaxResults>", listing.max_results));
    if let Some(d) = listing.delimiter {
        xml.push_str(&format!("<Delimiter>{}</Delimiter>", xml_escape(d)));
    }

    xml.push_str("<Blobs>");
    for blob in listing.blobs {
        xml.push_str(&serialize_blob(blob, listing.include_metadata));
    }
    for prefix in listing.blob_prefixes {
        xml.push_str(&format!(
            "<BlobPrefix><Name>{}</Name></BlobPrefix>",
            xml_escape(prefix)
        ));
    }
    xml.push_str("</Blobs>");

    xml.push_str(&format!(
        "<NextMarker>{}</NextMarker>",
        xml_escape(listing.next_marker.unwrap_or(""))
    ));
    xml.push_str("</EnumerationResults>");
    xml
}

/// Serializes a single blob for list results.
fn serialize_blob(blob: &BlobModel, include_metadata: bool) -> String {
    let props = &blob.properties;
    let mut xml = String::from("<Blob>");
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(&blob.name)));

    // Soft-delete is reported only when set; `false` is never written.
    if blob.deleted {
        xml.push_str("<Deleted>true</Deleted>");
    }
    if blob.is_snapshot() {
        xml.push_str(&format!("<Snapshot>{}</Snapshot>", xml_escape(&blob.snapshot)));
    }

    xml.push_str("<Properties>");
    xml.push_str(&format!(
        "<Creation-Time>{}</Creation-Time>",
        format_http_date(&props.created_on)
    ));
    xml.push_str(&format!(
        "<Last-Modified>{}</Last-Modified>",
        format_http_date(&props.last_modified)
    ));
    xml.push_str(&format!("<Etag>{}</Etag>", xml_escape(&props.etag)));
    xml.push_str(&format!(
        "<Content-Length>{}</Content-Length>",
        props.content_length
    ));

    let content_fields = [
        ("Content-Type", &props.content_type),
        ("Content-Encoding", &props.content_encoding),
        ("Content-Language", &props.content_language),
        ("Content-MD5", &props.content_md5),
        ("Content-Disposition", &props.content_disposition),
        ("Cache-Control", &props.cache_control),
    ];
    for (name, value) in content_fields {
        if let Some(value) = value {
            xml.push_str(&format!("<{}>{}</{}>", name, xml_escape(value), name));
        }
    }

    xml.push_str("<BlobType>BlockBlob</BlobType>");
    xml.push_str("<AccessTier>Hot</AccessTier><AccessTierInferred>true</AccessTierInferred>");
    xml.push_str(&serialize_lease(&props.lease));
    xml.push_str("<ServerEncrypted>true</ServerEncrypted>");

    if let Some(ref copy_id) = props.copy_id {
        xml.push_str(&format!("<CopyId>{}</CopyId>", xml_escape(copy_id)));
    }
    if let Some(status) = props.copy_status {
        xml.push_str(&format!("<CopyStatus>{}</CopyStatus>", status.as_str()));
    }
    if let Some(ref source) = props.copy_source {
        xml.push_str(&format!("<CopySource>{}</CopySource>", xml_escape(source)));
    }
    if let Some(ref progress) = props.copy_progress {
        xml.push_str(&format!(
            "<CopyProgress>{}</CopyProgress>",
            xml_escape(progress)
        ));
    }
    if let Some(ref completed) = props.copy_completion_time {
        xml.push_str(&format!(
            "<CopyCompletionTime>{}</CopyCompletionTime>",
            format_http_date(completed)
        ));
    }
    xml.push_str("</Properties>");

    if include_metadata {
        xml.push_str(&serialize_metadata(&blob.metadata));
    }

    xml.push_str("</Blob>");
    xml
}

/// Serializes service properties to XML.
///
/// Unset sections serialize as their defaults.
pub fn serialize_service_properties(props: &ServiceProperties) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str("<StorageServiceProperties>");

    let logging = props.logging.clone().unwrap_or_default();
    xml.push_str(&serialize_logging(&logging));

    let hour_metrics = props.hour_metrics.clone().unwrap_or_default();
    xml.push_str(&serialize_metrics("HourMetrics", &hour_metrics));
    let minute_metrics = props.minute_metrics.clone().unwrap_or_default();
    xml.push_str(&serialize_metrics("MinuteMetrics", &minute_metrics));

    match props.cors.as_deref() {
        Some(rules) if !rules.is_empty() => {
            xml.push_str("<Cors>");
            for rule in rules {
                xml.push_str(&serialize_cors_rule(rule));
            }
            xml.push_str("</Cors>");
        }
        _ => xml.push_str("<Cors />"),
    }

    if let Some(ref version) = props.default_service_version {
        xml.push_str(&format!(
            "<DefaultServiceVersion>{}</DefaultServiceVersion>",
            xml_escape(version)
        ));
    }

    let static_website = props.static_website.clone().unwrap_or_default();
    xml.push_str("<StaticWebsite>");
    xml.push_str(&format!("<Enabled>{}</Enabled>", static_website.enabled));
    if let Some(ref doc) = static_website.index_document {
        xml.push_str(&format!(
            "<IndexDocument>{}</IndexDocument>",
            xml_escape(doc)
        ));
    }
    if let Some(ref doc) = static_website.error_document_404_path {
        xml.push_str(&format!(
            "<ErrorDocument404Path>{}</ErrorDocument404Path>",
            xml_escape(doc)
        ));
    }
    xml.push_str("</StaticWebsite>");

    xml.push_str("</StorageServiceProperties>");
    xml
}

fn serialize_logging(logging: &LoggingConfig) -> String {
    let mut xml = String::from("<Logging>");
    xml.push_str(&format!("<Version>{}</Version>", xml_escape(&logging.version)));
    xml.push_str(&format!("<Read>{}</Read>", logging.read));
    xml.push_str(&format!("<Write>{}</Write>", logging.write));
    xml.push_str(&format!("<Delete>{}</Delete>", logging.delete));
    xml.push_str(&serialize_retention_policy(&logging.retention_policy));
    xml.push_str("</Logging>");
    xml
}

fn serialize_metrics(element: &str, metrics: &MetricsConfig) -> String {
    let mut xml = format!("<{}>", element);
    xml.push_str(&format!("<Version>{}</Version>", xml_escape(&metrics.version)));
    xml.push_str(&format!("<Enabled>{}</Enabled>", metrics.enabled));
    if let Some(include_apis) = metrics.include_apis {
        xml.push_str(&format!("<IncludeAPIs>{}</IncludeAPIs>", include_apis));
    }
    xml.push_str(&serialize_retention_policy(&metrics.retention_policy));
    xml.push_str(&format!("</{}>", element));
    xml
}

fn serialize_retention_policy(policy: &RetentionPolicy) -> String {
    let mut xml = String::from("<RetentionPolicy>");
    xml.push_str(&format!("<Enabled>{}</Enabled>", policy.enabled));
    if let Some(days) = policy.days {
        xml.push_str(&format!("<Days>{}</Days>", days));
    }
    xml.push_str("</RetentionPolicy>");
    xml
}

fn serialize_cors_rule(rule: &CorsRule) -> String {
    let mut xml = String::from("<CorsRule>");
    xml.push_str(&format!(
        "<AllowedOrigins>{}</AllowedOrigins>",
        xml_escape(&rule.allowed_origins.join(","))
    ));
    xml.push_str(&format!(
        "<AllowedMethods>{}</AllowedMethods>",
        xml_escape(&rule.allowed_methods.join(","))
    ));
    xml.push_str(&format!(
        "<AllowedHeaders>{}</AllowedHeaders>",
        xml_escape(&rule.allowed_headers.join(","))
    ));
    xml.push_str(&format!(
        "<ExposedHeaders>{}</ExposedHeaders>",
        xml_escape(&rule.exposed_headers.join(","))
    ));
    xml.push_str(&format!(
        "<MaxAgeInSeconds>{}</MaxAgeInSeconds>",
        rule.max_age_in_seconds
    ));
    xml.push_str("</CorsRule>");
    xml
}

/// Serializes signed identifiers (access policy) to XML, in stored order.
pub fn serialize_signed_identifiers(identifiers: &[SignedIdentifier]) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str("<SignedIdentifiers>");
    for id in identifiers {
        xml.push_str("<SignedIdentifier>");
        xml.push_str(&format!("<Id>{}</Id>", xml_escape(&id.id)));
        xml.push_str("<AccessPolicy>");
        if let Some(ref start) = id.access_policy.start {
            xml.push_str(&format!(
                "<Start>{}</Start>",
                format_iso8601(start)
            ));
        }
        if let Some(ref expiry) = id.access_policy.expiry {
            xml.push_str(&format!(
                "<Expiry>{}</Expiry>",
                format_iso8601(expiry)
            ));
        }
        if let Some(ref permission) = id.access_policy.permission {
            xml.push_str(&format!(
                "<Permission>{}</Permission>",
                xml_escape(permission)
            ));
        }
        xml.push_str("</AccessPolicy>");
        xml.push_str("</SignedIdentifier>");
    }
    xml.push_str("</SignedIdentifiers>");
    xml
}
