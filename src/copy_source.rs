//! Copy-source resolution and cross-account authorization.
//!
//! A copy whose source names another account is only allowed when the
//! source is served by this same instance and a `comp=metadata` probe
//! against it succeeds. The probe never fails on HTTP status: every
//! non-200 answer is classified into a `CannotVerifyCopySource` error that
//! carries the probe's status.

use axum::http::StatusCode;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ErrorCode, StorageError, StorageResult};

/// Request header naming the copy source.
pub const COPY_SOURCE_HEADER: &str = "x-ms-copy-source";

/// Request header carrying the source range for synchronous copies.
pub const SOURCE_RANGE_HEADER: &str = "x-ms-source-range";

const NOT_FOUND_MESSAGE: &str = "The specified resource does not exist";

/// A parsed `x-ms-copy-source` URL (path-style).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    pub url: Url,
    pub account: String,
    pub container: String,
    pub blob: String,
    /// Empty for the base blob.
    pub snapshot: String,
}

impl CopySource {
    /// Parses `http(s)://host[:port]/{account}/{container}/{blob}[?snapshot=..]`.
    pub fn parse(raw: &str) -> StorageResult<Self> {
        let invalid = || StorageError::invalid_header(COPY_SOURCE_HEADER, raw);

        let url = Url::parse(raw).map_err(|_| invalid())?;
        if url.host_str().is_none() {
            return Err(invalid());
        }

        // A well-formed URL that does not name a blob.
        let not_a_blob = || {
            StorageError::with_message(
                ErrorCode::InvalidSourceBlobUrl,
                format!("The source url {} does not name a blob.", raw),
            )
        };
        let mut parts = url.path().trim_start_matches('/').splitn(3, '/');
        let account = parts.next().filter(|s| !s.is_empty()).ok_or_else(not_a_blob)?;
        let container = parts.next().filter(|s| !s.is_empty()).ok_or_else(not_a_blob)?;
        let blob = parts.next().filter(|s| !s.is_empty()).ok_or_else(not_a_blob)?;

        let decode = |s: &str| {
            percent_encoding::percent_decode_str(s)
                .decode_utf8()
                .map(|d| d.into_owned())
                .map_err(|_| invalid())
        };

        let snapshot = url
            .query_pairs()
            .find(|(k, _)| k == "snapshot")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();

        Ok(Self {
            account: decode(account)?,
            container: decode(container)?,
            blob: decode(blob)?,
            snapshot,
            url,
        })
    }

    /// Whether the source lives under a different account than `account`.
    pub fn is_cross_account(&self, account: &str) -> bool {
        self.account != account
    }
}

/// Bytes and content headers fetched from a copy source.
#[derive(Debug, Clone)]
pub struct SourceContent {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Issues the authorization probe and content fetch for copy sources.
#[derive(Clone)]
pub struct CopySourceAuthorizer {
    client: reqwest::Client,
}

impl CopySourceAuthorizer {
    /// Creates an authorizer whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                StorageError::with_message(
                    ErrorCode::InternalError,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Verifies that `source` may be read on behalf of the request.
    ///
    /// `request_host` is the `Host` the request arrived on. A source on any
    /// other host fails without a probe.
    pub async fn authorize(&self, source: &Url, request_host: &str) -> StorageResult<()> {
        if !same_host(source, request_host) {
            debug!(source = %source, request_host, "copy source is on another host");
            return Err(StorageError::cannot_verify_copy_source(
                StatusCode::NOT_FOUND,
                NOT_FOUND_MESSAGE,
            ));
        }

        let mut probe = source.clone();
        probe.query_pairs_mut().append_pair("comp", "metadata");

        let response = self.client.get(probe).send().await.map_err(|e| {
            warn!(source = %source, error = %e, "copy source probe failed");
            StorageError::new(ErrorCode::CannotVerifyCopySource)
        })?;

        let status = response.status().as_u16();
        if status == 200 {
            debug!(source = %source, "copy source authorized");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_failure(status, &body);
        debug!(source = %source, status, message = %err.message, "copy source rejected");
        Err(err)
    }

    /// Fetches source content, forwarding only the source range.
    pub async fn fetch(&self, source: &Url, source_range: Option<&str>) -> StorageResult<SourceContent> {
        let mut request = self.client.get(source.clone());
        if let Some(range) = source_range {
            request = request.header(reqwest::header::RANGE, range);
        }

        let response = request.send().await.map_err(|e| {
            warn!(source = %source, error = %e, "copy source fetch failed");
            StorageError::new(ErrorCode::CannotVerifyCopySource)
        })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let data = response.bytes().await.map_err(|e| {
            warn!(source = %source, error = %e, "copy source body read failed");
            StorageError::new(ErrorCode::CannotVerifyCopySource)
        })?;

        Ok(SourceContent { data, content_type })
    }
}

/// Compares the source URL's authority with the request's `Host`.
pub fn same_host(source: &Url, request_host: &str) -> bool {
    let Ok(request) = Url::parse(&format!("{}://{}", source.scheme(), request_host)) else {
        return false;
    };
    let source_host = source.host_str().map(str::to_ascii_lowercase);
    let request_host = request.host_str().map(str::to_ascii_lowercase);
    source_host.is_some()
        && source_host == request_host
        && source.port_or_known_default() == request.port_or_known_default()
}

/// Maps a non-200 probe answer onto `CannotVerifyCopySource`.
fn classify_failure(status: u16, body: &str) -> StorageError {
    if status == 404 {
        return StorageError::cannot_verify_copy_source(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE);
    }
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = extract_error_message(body)
        .unwrap_or_else(|| ErrorCode::CannotVerifyCopySource.default_message().to_string());
    StorageError::cannot_verify_copy_source(status, message)
}

/// Pulls `<Message>` out of an XML error body, with newlines removed.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_message = false;
    let mut message = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => in_message = e.name().as_ref() == b"Message",
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"Message" {
                    let cleaned: String = message.chars().filter(|c| *c != '\n' && *c != '\r').collect();
                    return Some(cleaned);
                }
                in_message = false;
            }
            Ok(Event::Text(e)) if in_message => {
                message.push_str(&e.unescape().ok()?);
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_copy_source() {
        let source =
            CopySource::parse("http://127.0.0.1:10000/acct2/photos/dir%20a/cat.jpg?snapshot=2024-01-01T00:00:00.0000000Z")
                .unwrap();
        assert_eq!(source.account, "acct2");
        assert_eq!(source.container, "photos");
        assert_eq!(source.blob, "dir a/cat.jpg");
        assert_eq!(source.snapshot, "2024-01-01T00:00:00.0000000Z");
        assert!(source.is_cross_account("devstoreaccount1"));
    }

    #[test]
    fn test_unparsable_source_names_the_header() {
        for raw in ["not a url", "/devstoreaccount1/c/b"] {
            let err = CopySource::parse(raw).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidHeaderValue);
            assert!(err.message.contains(COPY_SOURCE_HEADER));
        }
    }

    #[test]
    fn test_source_without_blob_path() {
        for raw in [
            "http://127.0.0.1:10000/acct/c",
            "http://127.0.0.1:10000/acct/c/",
            "http://127.0.0.1:10000/",
        ] {
            let err = CopySource::parse(raw).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidSourceBlobUrl);
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_same_host_normalizes_default_ports() {
        let source = Url::parse("http://Example.com/acct/c/b").unwrap();
        assert!(same_host(&source, "example.com"));
        assert!(same_host(&source, "example.com:80"));
        assert!(!same_host(&source, "example.com:8080"));

        let source = Url::parse("http://127.0.0.1:10000/acct/c/b").unwrap();
        assert!(same_host(&source, "127.0.0.1:10000"));
        assert!(!same_host(&source, "localhost:10000"));
    }

    #[test]
    fn test_extract_message_strips_newlines() {
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <Error><Code>AuthenticationFailed</Code>\
            <Message>Server failed to authenticate the request.\nRequestId:abc\nTime:now</Message></Error>";
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("Server failed to authenticate the request.RequestId:abcTime:now")
        );
        assert_eq!(extract_error_message("plain text"), None);
        assert_eq!(extract_error_message(""), None);
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(404, "");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message, NOT_FOUND_MESSAGE);

        let err = classify_failure(403, "<Error><Message>denied</Message></Error>");
        assert_eq!(err.code, ErrorCode::CannotVerifyCopySource);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.message, "denied");

        let err = classify_failure(503, "busy");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.message, ErrorCode::CannotVerifyCopySource.default_message());
    }
}
