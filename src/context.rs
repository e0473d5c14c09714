//! Request context extraction and handling.

use axum::http::{header::HeaderMap, Method};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::DEFAULT_ACCOUNT;
use crate::models::Metadata;

/// Extracted request context containing all relevant information.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request ID.
    pub request_id: String,
    /// HTTP method.
    pub method: Method,
    /// Account name extracted from path.
    pub account: String,
    /// Container name (if present).
    pub container: Option<String>,
    /// Blob name (if present).
    pub blob: Option<String>,
    /// Query parameters.
    pub query_params: HashMap<String, String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request timestamp.
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context from request parts.
    pub fn new(
        method: Method,
        headers: HeaderMap,
        path_params: HashMap<String, String>,
        query_params: HashMap<String, String>,
    ) -> Self {
        let account = path_params
            .get("account")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());

        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            account,
            container: path_params.get("container").cloned(),
            blob: path_params.get("blob").cloned(),
            query_params,
            headers,
            timestamp: Utc::now(),
        }
    }

    /// Returns the value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `Host` the request was sent to.
    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    /// Returns the Content-MD5 header value.
    pub fn content_md5(&self) -> Option<&str> {
        self.header("content-md5")
    }

    /// Returns the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the Range header value parsed as (start, end).
    pub fn range(&self) -> Option<(u64, Option<u64>)> {
        self.header("x-ms-range")
            .or_else(|| self.header("range"))
            .and_then(parse_range_header)
    }

    /// Returns the x-ms-lease-id header value.
    pub fn lease_id(&self) -> Option<&str> {
        self.header("x-ms-lease-id")
    }

    /// Returns the x-ms-copy-source header value.
    pub fn copy_source(&self) -> Option<&str> {
        self.header("x-ms-copy-source")
    }

    /// Whether `x-ms-requires-sync: true` was sent.
    pub fn requires_sync(&self) -> bool {
        self.header("x-ms-requires-sync")
            .map_or(false, |v| v.eq_ignore_ascii_case("true"))
    }

    /// Returns user-defined metadata from x-ms-meta-* headers, in header order.
    pub fn metadata(&self) -> Metadata {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix("x-ms-meta-")?;
                value.to_str().ok().map(|v| (key.to_string(), v.to_string()))
            })
            .collect()
    }

    /// Returns the snapshot query parameter.
    pub fn snapshot(&self) -> Option<&str> {
        self.query_param("snapshot")
    }

    /// Returns the restype query parameter.
    pub fn restype(&self) -> Option<&str> {
        self.query_param("restype")
    }

    /// Returns the comp query parameter.
    pub fn comp(&self) -> Option<&str> {
        self.query_param("comp")
    }
}

/// Parses a Range header value like "bytes=0-1023" or "bytes=0-".
pub fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse().ok()?),
    };
    Some((start, end))
}

/// Query parameters for list operations.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    pub maxresults: Option<String>,
    pub include: Vec<String>,
}

impl ListParams {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let include = query
            .get("include")
            .map(|s| {
                s.split(',')
                    .map(|v| v.trim().to_ascii_lowercase())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            prefix: query.get("prefix").cloned(),
            delimiter: query.get("delimiter").cloned(),
            marker: query.get("marker").cloned().filter(|m| !m.is_empty()),
            maxresults: query.get("maxresults").cloned(),
            include,
        }
    }

    /// Whether `include=` lists `what`.
    pub fn includes(&self, what: &str) -> bool {
        self.include.iter().any(|i| i == what)
    }
}

/// Formats a DateTime as RFC 1123 format for HTTP headers.
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Formats a DateTime as ISO 8601 with 100ns precision.
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    format!(
        "{}.{:07}Z",
        dt.format("%Y-%m-%dT%H:%M:%S"),
        dt.timestamp_subsec_nanos() / 100
    )
}
