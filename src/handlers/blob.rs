//! Blob-level handlers for Azure Blob Storage API.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Response, StatusCode},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::Utc;
use md5::{Digest, Md5};
use tracing::debug;

use crate::context::{format_http_date, parse_range_header, RequestContext};
use crate::copy_source::{CopySource, SourceContent, COPY_SOURCE_HEADER, SOURCE_RANGE_HEADER};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{BlobModel, BlobProperties, CopyStatus, Metadata};
use crate::router::AppState;
use crate::storage::DeleteSnapshots;

use super::{
    add_blob_headers, add_lease_headers, add_lease_response_headers, add_metadata_headers,
    build_response, common_headers, lease_action, lease_status_code, release_extents,
    set_header,
};

fn blob_target(ctx: &RequestContext) -> StorageResult<(&str, &str)> {
    let container = ctx
        .container
        .as_deref()
        .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))?;
    let blob = ctx
        .blob
        .as_deref()
        .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;
    Ok((container, blob))
}

/// Resolves a byte range against a blob length, as (offset, count).
fn resolve_range(range: (u64, Option<u64>), length: u64) -> StorageResult<(u64, u64)> {
    let (start, end) = range;
    if start >= length {
        return Err(StorageError::new(ErrorCode::InvalidRange));
    }
    let last = end.unwrap_or(length - 1).min(length - 1);
    if last < start {
        return Err(StorageError::new(ErrorCode::InvalidRange));
    }
    Ok((start, last - start + 1))
}

/// Reads a blob's content, optionally restricted to a range.
async fn read_content(
    state: &AppState,
    blob: &BlobModel,
    range: Option<(u64, u64)>,
) -> StorageResult<Bytes> {
    let Some(ref extent) = blob.extent else {
        return Ok(Bytes::new());
    };
    match range {
        Some((offset, count)) => state.extents.read_range(extent, offset, count).await,
        None => state.extents.read(extent).await,
    }
}

/// Content headers shared by GET and HEAD.
fn add_content_headers(headers: &mut HeaderMap, props: &BlobProperties) {
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
            set_header(headers, name, value);
        }
    }
}

fn add_copy_headers(headers: &mut HeaderMap, props: &BlobProperties) {
    if let Some(ref copy_id) = props.copy_id {
        set_header(headers, "x-ms-copy-id", copy_id);
    }
    if let Some(ref source) = props.copy_source {
        set_header(headers, COPY_SOURCE_HEADER, source);
    }
    if let Some(status) = props.copy_status {
        headers.insert("x-ms-copy-status", HeaderValue::from_static(status.as_str()));
    }
    if let Some(ref progress) = props.copy_progress {
        set_header(headers, "x-ms-copy-progress", progress);
    }
    if let Some(ref completed) = props.copy_completion_time {
        set_header(headers, "x-ms-copy-completion-time", &format_http_date(completed));
    }
}

fn blob_property_headers(ctx: &RequestContext, blob: &BlobModel) -> HeaderMap {
    let props = &blob.properties;
    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &props.etag, &props.last_modified);
    add_content_headers(&mut headers, props);
    add_lease_headers(&mut headers, &props.lease);
    add_copy_headers(&mut headers, props);
    add_metadata_headers(&mut headers, &blob.metadata);
    headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
    headers.insert("x-ms-server-encrypted", HeaderValue::from_static("true"));
    headers.insert("x-ms-access-tier", HeaderValue::from_static("Hot"));
    headers.insert("x-ms-access-tier-inferred", HeaderValue::from_static("true"));
    headers.insert("Accept-Ranges", HeaderValue::from_static("bytes"));
    set_header(
        &mut headers,
        "x-ms-creation-time",
        &format_http_date(&props.created_on),
    );
    headers
}

/// PUT /{container}/{blob} - Upload a block blob in one request.
pub async fn upload_blob(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;

    match ctx.header("x-ms-blob-type") {
        None | Some("BlockBlob") => {}
        Some(_) => return Err(StorageError::new(ErrorCode::NotImplemented)),
    }

    let computed_md5 = BASE64.encode(Md5::digest(&body));
    if let Some(expected) = ctx.content_md5() {
        if expected != computed_md5 {
            return Err(StorageError::new(ErrorCode::Md5Mismatch));
        }
    }

    let content_length = body.len() as u64;
    let mut blob = BlobModel::new(
        ctx.account.clone(),
        container.to_string(),
        blob_name.to_string(),
        content_length,
    );
    if content_length > 0 {
        blob.extent = Some(state.extents.write(body).await?);
    }

    let props = &mut blob.properties;
    if let Some(ct) = ctx.header("x-ms-blob-content-type").or_else(|| ctx.content_type()) {
        props.content_type = Some(ct.to_string());
    }
    props.content_encoding = ctx.header("x-ms-blob-content-encoding").map(String::from);
    props.content_language = ctx.header("x-ms-blob-content-language").map(String::from);
    props.content_disposition = ctx.header("x-ms-blob-content-disposition").map(String::from);
    props.cache_control = ctx.header("x-ms-blob-cache-control").map(String::from);
    props.content_md5 = Some(
        ctx.header("x-ms-blob-content-md5")
            .map(String::from)
            .unwrap_or_else(|| computed_md5.clone()),
    );
    blob.metadata = ctx.metadata();

    let new_extent = blob.extent.clone();
    let (version, replaced) = match state.metadata.create_blob(blob, ctx.lease_id()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            release_extents(state, new_extent.into_iter().collect()).await;
            return Err(e);
        }
    };
    release_extents(state, replaced.into_iter().collect()).await;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &version.etag, &version.last_modified);
    set_header(&mut headers, "Content-MD5", &computed_md5);
    headers.insert("x-ms-request-server-encrypted", HeaderValue::from_static("true"));
    Ok(build_response(StatusCode::CREATED, headers, Body::empty()))
}

/// GET /{container}/{blob} - Download blob.
pub async fn download_blob(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let snapshot = ctx.snapshot().unwrap_or("");
    let blob = state
        .metadata
        .get_blob(&ctx.account, container, blob_name, snapshot)
        .await?;
    let length = blob.properties.content_length;

    let range = ctx
        .range()
        .map(|r| resolve_range(r, length))
        .transpose()?;
    let data = read_content(state, &blob, range).await?;

    let mut headers = blob_property_headers(ctx, &blob);
    set_header(&mut headers, "Content-Length", &data.len().to_string());
    let status = match range {
        Some((offset, count)) => {
            set_header(
                &mut headers,
                "Content-Range",
                &format!("bytes {}-{}/{}", offset, offset + count - 1, length),
            );
            StatusCode::PARTIAL_CONTENT
        }
        None => StatusCode::OK,
    };

    Ok(build_response(status, headers, Body::from(data)))
}

/// HEAD /{container}/{blob} - Get blob properties.
pub async fn get_blob_properties(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let snapshot = ctx.snapshot().unwrap_or("");
    let blob = state
        .metadata
        .get_blob(&ctx.account, container, blob_name, snapshot)
        .await?;

    let mut headers = blob_property_headers(ctx, &blob);
    set_header(
        &mut headers,
        "Content-Length",
        &blob.properties.content_length.to_string(),
    );
    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// GET/HEAD /{container}/{blob}?comp=metadata - Get blob metadata.
///
/// Also the target of the copy-source authorization probe.
pub async fn get_blob_metadata(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let snapshot = ctx.snapshot().unwrap_or("");
    let blob = state
        .metadata
        .get_blob(&ctx.account, container, blob_name, snapshot)
        .await?;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &blob.properties.etag, &blob.properties.last_modified);
    add_metadata_headers(&mut headers, &blob.metadata);
    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// PUT /{container}/{blob}?comp=metadata - Set blob metadata.
pub async fn set_blob_metadata(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let version = state
        .metadata
        .set_blob_metadata(
            &ctx.account,
            container,
            blob_name,
            ctx.metadata(),
            ctx.lease_id(),
        )
        .await?;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &version.etag, &version.last_modified);
    headers.insert("x-ms-request-server-encrypted", HeaderValue::from_static("true"));
    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// DELETE /{container}/{blob} - Delete blob or snapshot.
pub async fn delete_blob(ctx: &RequestContext, state: &AppState) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let snapshot = ctx.snapshot().unwrap_or("");
    let delete_snapshots = match ctx.header("x-ms-delete-snapshots") {
        None => DeleteSnapshots::None,
        Some(v) if v.eq_ignore_ascii_case("include") => DeleteSnapshots::Include,
        Some(v) if v.eq_ignore_ascii_case("only") => DeleteSnapshots::Only,
        Some(v) => return Err(StorageError::invalid_header("x-ms-delete-snapshots", v)),
    };

    let extents = state
        .metadata
        .delete_blob(
            &ctx.account,
            container,
            blob_name,
            snapshot,
            delete_snapshots,
            ctx.lease_id(),
        )
        .await?;
    release_extents(state, extents).await;

    let mut headers = common_headers(ctx);
    headers.insert("x-ms-delete-type-permanent", HeaderValue::from_static("true"));
    Ok(build_response(StatusCode::ACCEPTED, headers, Body::empty()))
}

/// PUT /{container}/{blob}?comp=snapshot - Create snapshot.
pub async fn create_snapshot(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let metadata = Some(ctx.metadata()).filter(|m: &Metadata| !m.is_empty());

    let (snapshot, version) = state
        .metadata
        .create_snapshot(&ctx.account, container, blob_name, metadata, ctx.lease_id())
        .await?;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &version.etag, &version.last_modified);
    set_header(&mut headers, "x-ms-snapshot", &snapshot);
    headers.insert("x-ms-request-server-encrypted", HeaderValue::from_static("false"));
    Ok(build_response(StatusCode::CREATED, headers, Body::empty()))
}

/// PUT /{container}/{blob}?comp=lease - Blob lease operations.
pub async fn blob_lease(ctx: &RequestContext, state: &AppState) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let action = lease_action(ctx)?;
    let status = lease_status_code(&action);

    let outcome = state
        .metadata
        .lease_blob(&ctx.account, container, blob_name, action)
        .await?;

    let mut headers = common_headers(ctx);
    add_lease_response_headers(&mut headers, &outcome);
    Ok(build_response(status, headers, Body::empty()))
}

/// PUT /{container}/{blob} with x-ms-copy-source - Copy blob.
///
/// Sources under another account must pass the authorization probe first.
/// An asynchronous copy then reads the source from the local store; a
/// synchronous copy (`x-ms-requires-sync: true`) of a cross-account source
/// downloads it through a second request carrying only the source range.
/// Either way the copy completes before the response.
pub async fn copy_blob(ctx: &RequestContext, state: &AppState) -> StorageResult<Response<Body>> {
    let (container, blob_name) = blob_target(ctx)?;
    let raw_source = ctx.copy_source().ok_or_else(|| {
        StorageError::with_message(
            ErrorCode::MissingRequiredHeader,
            format!("A required header was not specified: {}", COPY_SOURCE_HEADER),
        )
    })?;
    let source = CopySource::parse(raw_source)?;
    let sync = ctx.requires_sync();
    let source_range = ctx.header(SOURCE_RANGE_HEADER);

    let cross_account = source.is_cross_account(&ctx.account);
    if cross_account {
        let request_host = ctx
            .host()
            .map(String::from)
            .unwrap_or_else(|| state.config.blob_bind_address());
        state
            .copy_auth
            .authorize(&source.url, &request_host)
            .await?;
    }

    let (content, template) = if sync && cross_account {
        let fetched = state.copy_auth.fetch(&source.url, source_range).await?;
        (fetched, None)
    } else {
        let source_blob = state
            .metadata
            .get_blob(&source.account, &source.container, &source.blob, &source.snapshot)
            .await?;
        let range = match source_range.filter(|_| sync) {
            Some(raw) => {
                let parsed = parse_range_header(raw)
                    .ok_or_else(|| StorageError::invalid_header(SOURCE_RANGE_HEADER, raw))?;
                Some(resolve_range(parsed, source_blob.properties.content_length)?)
            }
            None => None,
        };
        let data = read_content(state, &source_blob, range).await?;
        let content_type = source_blob.properties.content_type.clone();
        (SourceContent { data, content_type }, Some(source_blob))
    };

    let content_length = content.data.len() as u64;
    let mut blob = BlobModel::new(
        ctx.account.clone(),
        container.to_string(),
        blob_name.to_string(),
        content_length,
    );

    // Content headers and metadata follow the source unless the request sets them.
    if let Some(ref source_blob) = template {
        let from = &source_blob.properties;
        let props = &mut blob.properties;
        props.content_encoding = from.content_encoding.clone();
        props.content_language = from.content_language.clone();
        props.content_disposition = from.content_disposition.clone();
        props.cache_control = from.cache_control.clone();
        blob.metadata = source_blob.metadata.clone();
    }
    if let Some(ct) = content.content_type {
        blob.properties.content_type = Some(ct);
    }
    blob.properties.content_md5 = Some(BASE64.encode(Md5::digest(&content.data)));
    let request_metadata = ctx.metadata();
    if !request_metadata.is_empty() {
        blob.metadata = request_metadata;
    }

    let copy_id = uuid::Uuid::new_v4().to_string();
    let props = &mut blob.properties;
    props.copy_id = Some(copy_id.clone());
    props.copy_source = Some(raw_source.to_string());
    props.copy_status = Some(CopyStatus::Success);
    props.copy_progress = Some(format!("{}/{}", content_length, content_length));
    props.copy_completion_time = Some(Utc::now());

    if content_length > 0 {
        blob.extent = Some(state.extents.write(content.data).await?);
    }
    let new_extent = blob.extent.clone();
    let (version, replaced) = match state.metadata.create_blob(blob, ctx.lease_id()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            release_extents(state, new_extent.into_iter().collect()).await;
            return Err(e);
        }
    };
    release_extents(state, replaced.into_iter().collect()).await;

    debug!(
        source = %source.url,
        cross_account,
        sync,
        bytes = content_length,
        "copied blob"
    );

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &version.etag, &version.last_modified);
    set_header(&mut headers, "x-ms-copy-id", &copy_id);
    headers.insert(
        "x-ms-copy-status",
        HeaderValue::from_static(CopyStatus::Success.as_str()),
    );
    Ok(build_response(StatusCode::ACCEPTED, headers, Body::empty()))
}
