//! Service-level handlers for Azure Blob Storage API.

use axum::{
    body::Body,
    http::{HeaderValue, Response, StatusCode},
};
use bytes::Bytes;

use crate::config::DEFAULT_API_VERSION;
use crate::context::{ListParams, RequestContext};
use crate::error::StorageResult;
use crate::listing::{parse_offset_marker, resolve_max_results, DEFAULT_CONTAINER_PAGE_SIZE};
use crate::router::AppState;
use crate::xml::{parse_service_properties, serialize_container_list, serialize_service_properties};

use super::{body_text, build_response, common_headers, service_endpoint, xml_response};

/// GET /?comp=list - List containers.
pub async fn list_containers(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let params = ListParams::from_query(&ctx.query_params);
    let max_results =
        resolve_max_results(params.maxresults.as_deref(), DEFAULT_CONTAINER_PAGE_SIZE)?;
    let offset = parse_offset_marker(params.marker.as_deref())?;

    let page = state
        .metadata
        .list_containers(&ctx.account, params.prefix.as_deref(), max_results, offset)
        .await?;

    let xml = serialize_container_list(
        &service_endpoint(ctx, state),
        &page.items,
        params.prefix.as_deref(),
        params.marker.as_deref(),
        max_results,
        page.next_marker.as_deref(),
        params.includes("metadata"),
    );
    Ok(xml_response(ctx, xml))
}

/// GET /?restype=service&comp=properties - Get service properties.
pub async fn get_service_properties(
    ctx: &RequestContext,
    state: &AppState,
) -> StorageResult<Response<Body>> {
    let stored = state.metadata.get_service_properties(&ctx.account).await?;
    let xml = serialize_service_properties(&stored.with_defaults(DEFAULT_API_VERSION));
    Ok(xml_response(ctx, xml))
}

/// PUT /?restype=service&comp=properties - Set service properties.
pub async fn set_service_properties(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    let update = parse_service_properties(body_text(&body)?)?;
    state
        .metadata
        .set_service_properties(&ctx.account, update)
        .await?;

    Ok(build_response(
        StatusCode::ACCEPTED,
        common_headers(ctx),
        Body::empty(),
    ))
}

/// GET/HEAD /?restype=account&comp=properties - Get account info.
pub async fn get_account_info(ctx: &RequestContext) -> StorageResult<Response<Body>> {
    let mut headers = common_headers(ctx);
    headers.insert("x-ms-sku-name", HeaderValue::from_static("Standard_LRS"));
    headers.insert("x-ms-account-kind", HeaderValue::from_static("StorageV2"));
    headers.insert("x-ms-is-hns-enabled", HeaderValue::from_static("false"));

    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}
