//! Request handlers for Azure Blob Storage API.

mod blob;
mod container;
mod service;

pub use blob::*;
pub use container::*;
pub use service::*;

use axum::body::Body;
use axum::http::{header::HeaderName, HeaderMap, HeaderValue, Response, StatusCode};
use chrono::{DateTime, Utc};

use crate::config::DEFAULT_API_VERSION;
use crate::context::{format_http_date, RequestContext};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::lease::LeaseAction;
use crate::models::{ExtentChunk, LeaseProperties, Metadata};
use crate::router::AppState;
use crate::storage::LeaseResponse;

/// Sets `name` when `value` is a valid header value; invalid values are dropped.
pub fn set_header<K>(headers: &mut HeaderMap, name: K, value: &str)
where
    K: axum::http::header::IntoHeaderName,
{
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Creates common response headers for Azure Blob Storage API responses.
pub fn common_headers(ctx: &RequestContext) -> HeaderMap {
    let mut headers = HeaderMap::new();
    set_header(&mut headers, "x-ms-request-id", &ctx.request_id);
    headers.insert("x-ms-version", HeaderValue::from_static(DEFAULT_API_VERSION));
    set_header(&mut headers, "Date", &format_http_date(&Utc::now()));
    headers.insert("server", HeaderValue::from_static("blobcore"));
    headers
}

/// Adds ETag and Last-Modified headers.
pub fn add_blob_headers(headers: &mut HeaderMap, etag: &str, last_modified: &DateTime<Utc>) {
    set_header(headers, "ETag", etag);
    set_header(headers, "Last-Modified", &format_http_date(last_modified));
}

/// Adds the lease status/state/duration headers for a reconciled lease.
pub fn add_lease_headers(headers: &mut HeaderMap, lease: &LeaseProperties) {
    headers.insert(
        "x-ms-lease-status",
        HeaderValue::from_static(lease.status().as_str()),
    );
    headers.insert(
        "x-ms-lease-state",
        HeaderValue::from_static(lease.state.as_str()),
    );
    if let Some(duration) = lease.reported_duration() {
        headers.insert(
            "x-ms-lease-duration",
            HeaderValue::from_static(duration.as_str()),
        );
    }
}

/// Adds the id/time headers a lease operation answers with.
pub fn add_lease_response_headers(headers: &mut HeaderMap, response: &LeaseResponse) {
    add_blob_headers(headers, &response.etag, &response.last_modified);
    if let Some(ref id) = response.lease_id {
        set_header(headers, "x-ms-lease-id", id);
    }
    if let Some(time) = response.lease_time {
        set_header(headers, "x-ms-lease-time", &time.to_string());
    }
}

/// Emits user metadata as `x-ms-meta-*` headers.
pub fn add_metadata_headers(headers: &mut HeaderMap, metadata: &Metadata) {
    for (key, value) in metadata.iter() {
        let Ok(name) = HeaderName::from_bytes(format!("x-ms-meta-{}", key).as_bytes()) else {
            continue;
        };
        set_header(headers, name, value);
    }
}

/// Builds a response with the given status, headers, and body.
pub fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Builds a 200 response carrying an XML document.
pub fn xml_response(ctx: &RequestContext, xml: String) -> Response<Body> {
    let mut headers = common_headers(ctx);
    headers.insert("Content-Type", HeaderValue::from_static("application/xml"));
    build_response(StatusCode::OK, headers, Body::from(xml))
}

/// The `ServiceEndpoint` reported in listings.
pub fn service_endpoint(ctx: &RequestContext, state: &AppState) -> String {
    let host = ctx
        .host()
        .map(String::from)
        .unwrap_or_else(|| state.config.blob_bind_address());
    format!("http://{}/{}", host, ctx.account)
}

/// Rejects operations the emulator does not provide.
pub fn not_implemented(ctx: &RequestContext) -> StorageResult<Response<Body>> {
    tracing::debug!(
        method = %ctx.method,
        comp = ctx.comp().unwrap_or(""),
        "operation not implemented"
    );
    Err(StorageError::new(ErrorCode::NotImplemented))
}

/// Decodes a request body as UTF-8 XML text.
pub(crate) fn body_text(body: &[u8]) -> StorageResult<&str> {
    std::str::from_utf8(body).map_err(|_| StorageError::new(ErrorCode::InvalidXmlDocument))
}

/// Reads the lease headers into an action. `x-ms-lease-action` is required.
pub(crate) fn lease_action(ctx: &RequestContext) -> StorageResult<LeaseAction> {
    let action = ctx.header("x-ms-lease-action").ok_or_else(|| {
        StorageError::with_message(
            ErrorCode::MissingRequiredHeader,
            "A required header was not specified: x-ms-lease-action",
        )
    })?;
    LeaseAction::parse(
        action,
        ctx.lease_id(),
        ctx.header("x-ms-proposed-lease-id"),
        ctx.header("x-ms-lease-duration"),
        ctx.header("x-ms-lease-break-period"),
    )
}

/// Acquire answers 201, break 202, everything else 200.
pub(crate) fn lease_status_code(action: &LeaseAction) -> StatusCode {
    match action {
        LeaseAction::Acquire { .. } => StatusCode::CREATED,
        LeaseAction::Break { .. } => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    }
}

/// Drops content the metadata store no longer references.
pub(crate) async fn release_extents(state: &AppState, extents: Vec<ExtentChunk>) {
    for extent in extents {
        if let Err(e) = state.extents.delete(&extent.id).await {
            tracing::warn!(extent = %extent.id, error = %e, "failed to release extent");
        }
    }
}
