//! Container-level handlers for Azure Blob Storage API.

use axum::{
    body::Body,
    http::{HeaderValue, Response, StatusCode},
};
use bytes::Bytes;
use tracing::debug;

use crate::context::{ListParams, RequestContext};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::listing::{effective_delimiter, group_by_delimiter, resolve_max_results, DEFAULT_BLOB_PAGE_SIZE};
use crate::models::{ContainerModel, PublicAccessLevel};
use crate::router::AppState;
use crate::storage::ListBlobsOptions;
use crate::xml::{
    parse_signed_identifiers, serialize_blob_list, serialize_signed_identifiers, BlobListing,
};

use super::{
    add_blob_headers, add_lease_headers, add_lease_response_headers, add_metadata_headers,
    body_text, build_response, common_headers, lease_action, lease_status_code, release_extents,
    service_endpoint, set_header, xml_response,
};

const PUBLIC_ACCESS_HEADER: &str = "x-ms-blob-public-access";

fn container_name(ctx: &RequestContext) -> StorageResult<&str> {
    ctx.container
        .as_deref()
        .ok_or_else(|| StorageError::new(ErrorCode::InvalidResourceName))
}

fn public_access(ctx: &RequestContext) -> StorageResult<PublicAccessLevel> {
    match ctx.header(PUBLIC_ACCESS_HEADER) {
        None => Ok(PublicAccessLevel::None),
        Some(value) => PublicAccessLevel::from_str(value)
            .ok_or_else(|| StorageError::invalid_header(PUBLIC_ACCESS_HEADER, value)),
    }
}

/// PUT /{container}?restype=container - Create container.
pub async fn create_container(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    validate_container_name(name)?;

    let mut container = ContainerModel::new(ctx.account.clone(), name.to_string());
    container.properties.public_access = public_access(ctx)?;
    container.metadata = ctx.metadata();

    let version = state.metadata.create_container(container).await?;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &version.etag, &version.last_modified);
    Ok(build_response(StatusCode::CREATED, headers, Body::empty()))
}

/// DELETE /{container}?restype=container - Delete container.
pub async fn delete_container(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    let extents = state
        .metadata
        .delete_container(&ctx.account, name, ctx.lease_id())
        .await?;
    release_extents(state, extents).await;

    Ok(build_response(
        StatusCode::ACCEPTED,
        common_headers(ctx),
        Body::empty(),
    ))
}

/// GET/HEAD /{container}?restype=container - Get container properties.
pub async fn get_container_properties(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    let container = state
        .metadata
        .get_container_properties(&ctx.account, name)
        .await?;
    let props = &container.properties;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &props.etag, &props.last_modified);
    add_lease_headers(&mut headers, &props.lease);
    if props.public_access != PublicAccessLevel::None {
        headers.insert(
            PUBLIC_ACCESS_HEADER,
            HeaderValue::from_static(props.public_access.as_str()),
        );
    }
    set_header(
        &mut headers,
        "x-ms-has-immutability-policy",
        &props.has_immutability_policy.to_string(),
    );
    set_header(
        &mut headers,
        "x-ms-has-legal-hold",
        &props.has_legal_hold.to_string(),
    );
    add_metadata_headers(&mut headers, &container.metadata);

    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// PUT /{container}?restype=container&comp=metadata - Set container metadata.
pub async fn set_container_metadata(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    let version = state
        .metadata
        .set_container_metadata(&ctx.account, name, ctx.metadata(), ctx.lease_id())
        .await?;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &version.etag, &version.last_modified);
    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// GET /{container}?restype=container&comp=acl - Get container access policy.
pub async fn get_container_acl(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    let acl = state
        .metadata
        .get_container_acl(&ctx.account, name, ctx.lease_id())
        .await?;

    let mut response = xml_response(ctx, serialize_signed_identifiers(&acl.signed_identifiers));
    let headers = response.headers_mut();
    add_blob_headers(headers, &acl.etag, &acl.last_modified);
    if acl.public_access != PublicAccessLevel::None {
        headers.insert(
            PUBLIC_ACCESS_HEADER,
            HeaderValue::from_static(acl.public_access.as_str()),
        );
    }
    Ok(response)
}

/// PUT /{container}?restype=container&comp=acl - Set container access policy.
///
/// The body replaces the stored identifiers wholesale; an empty body clears them.
pub async fn set_container_acl(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    let identifiers = parse_signed_identifiers(body_text(&body)?)?;
    let access = public_access(ctx)?;

    let version = state
        .metadata
        .set_container_acl(&ctx.account, name, access, identifiers, ctx.lease_id())
        .await?;

    let mut headers = common_headers(ctx);
    add_blob_headers(&mut headers, &version.etag, &version.last_modified);
    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// PUT /{container}?comp=lease&restype=container - Container lease operations.
pub async fn container_lease(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    let action = lease_action(ctx)?;
    let status = lease_status_code(&action);

    let outcome = state
        .metadata
        .lease_container(&ctx.account, name, action)
        .await?;

    let mut headers = common_headers(ctx);
    add_lease_response_headers(&mut headers, &outcome);
    Ok(build_response(status, headers, Body::empty()))
}

/// GET /{container}?restype=container&comp=list - List blobs.
///
/// The page is cut from the flat, name-ordered scan; when a delimiter is
/// given the page is then folded into blobs and virtual directories.
pub async fn list_blobs(ctx: &RequestContext, state: &AppState) -> StorageResult<Response<Body>> {
    let name = container_name(ctx)?;
    let params = ListParams::from_query(&ctx.query_params);
    let max_results = resolve_max_results(params.maxresults.as_deref(), DEFAULT_BLOB_PAGE_SIZE)?;
    let delimiter = effective_delimiter(params.delimiter.as_deref());

    let options = ListBlobsOptions {
        prefix: params.prefix.clone(),
        marker: params.marker.clone(),
        max_results,
        include_snapshots: params.includes("snapshots"),
        include_deleted: params.includes("deleted"),
    };
    let page = state.metadata.list_blobs(&ctx.account, name, &options).await?;

    let (blobs, prefixes) = match delimiter.as_deref() {
        Some(d) => group_by_delimiter(
            page.items,
            |b| b.name.as_str(),
            params.prefix.as_deref().unwrap_or(""),
            d,
        ),
        None => (page.items, Vec::new()),
    };
    debug!(
        container = name,
        blobs = blobs.len(),
        prefixes = prefixes.len(),
        "listed blobs"
    );

    let endpoint = service_endpoint(ctx, state);
    let xml = serialize_blob_list(&BlobListing {
        service_endpoint: &endpoint,
        container: name,
        prefix: params.prefix.as_deref(),
        marker: params.marker.as_deref(),
        delimiter: delimiter.as_deref(),
        max_results,
        blobs: &blobs,
        blob_prefixes: &prefixes,
        next_marker: page.next_marker.as_deref(),
        include_metadata: params.includes("metadata"),
    });
    Ok(xml_response(ctx, xml))
}

/// Validates a container name.
///
/// 3-63 characters of lowercase letters, digits and hyphens, starting with a
/// letter or digit, without consecutive hyphens. `$root`, `$logs` and `$web`
/// are accepted as is.
pub fn validate_container_name(name: &str) -> StorageResult<()> {
    if matches!(name, "$root" | "$logs" | "$web") {
        return Ok(());
    }

    let invalid = |reason: &str| -> StorageResult<()> {
        Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            format!("The specified resource name is not valid: {}", reason),
        ))
    };

    if name.len() < 3 || name.len() > 63 {
        return invalid("container names must be between 3 and 63 characters");
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return invalid("container names must start with a letter or number");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("container names may only contain lowercase letters, numbers and hyphens");
    }
    if name.contains("--") || name.ends_with('-') {
        return invalid("container names cannot contain consecutive hyphens or end with one");
    }
    Ok(())
}
