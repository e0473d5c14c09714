//! Request routing for Azure Blob Storage API.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Response},
    response::IntoResponse,
    routing::any,
    Router,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::context::RequestContext;
use crate::copy_source::CopySourceAuthorizer;
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::handlers;
use crate::storage::{ExtentStore, MetadataStore};

/// Application state shared between handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub metadata: Arc<dyn MetadataStore>,
    pub extents: Arc<dyn ExtentStore>,
    pub copy_auth: CopySourceAuthorizer,
}

/// Creates the main router for the blob service.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(service_handler))
        .route("/:account", any(service_handler))
        .route("/:account/:container", any(container_handler))
        .route("/:account/:container/*blob", any(blob_handler))
        .with_state(state)
}

/// Which URL level a request addresses.
#[derive(Debug, Clone, Copy)]
enum Level {
    Service,
    Container,
    Blob,
}

/// `/` has no path parameters, so the account falls back to the default.
async fn service_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    params: Option<Path<HashMap<String, String>>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response<Body> {
    let params = params.map(|Path(p)| p).unwrap_or_default();
    let ctx = RequestContext::new(method, headers, params, query);
    dispatch(Level::Service, ctx, state, body).await
}

async fn container_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response<Body> {
    let ctx = RequestContext::new(method, headers, params, query);
    dispatch(Level::Container, ctx, state, body).await
}

async fn blob_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response<Body> {
    let ctx = RequestContext::new(method, headers, params, query);
    dispatch(Level::Blob, ctx, state, body).await
}

async fn dispatch(level: Level, ctx: RequestContext, state: AppState, body: Bytes) -> Response<Body> {
    let result = match check_account(&ctx, &state.config) {
        Ok(()) => match level {
            Level::Service => route_service_request(&ctx, &state, body).await,
            Level::Container => route_container_request(&ctx, &state, body).await,
            Level::Blob => route_blob_request(&ctx, &state, body).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            debug!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                code = e.code.as_str(),
                "request failed"
            );
            e.with_request_id(&ctx.request_id).into_response()
        }
    }
}

/// Only configured accounts are served.
fn check_account(ctx: &RequestContext, config: &Config) -> StorageResult<()> {
    if config.get_account_key(&ctx.account).is_some() {
        return Ok(());
    }
    Err(StorageError::with_message(
        ErrorCode::AuthenticationFailed,
        format!(
            "Server failed to authenticate the request. Account {} does not exist.",
            ctx.account
        ),
    ))
}

/// Routes service-level requests.
async fn route_service_request(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    match (ctx.method.as_str(), ctx.restype(), ctx.comp()) {
        ("GET", None, Some("list")) => handlers::list_containers(ctx, state).await,
        ("GET", Some("service"), Some("properties")) => {
            handlers::get_service_properties(ctx, state).await
        }
        ("PUT", Some("service"), Some("properties")) => {
            handlers::set_service_properties(ctx, state, body).await
        }
        ("GET" | "HEAD", Some("account"), Some("properties")) => {
            handlers::get_account_info(ctx).await
        }
        ("POST", Some("service"), Some("userdelegationkey")) | ("POST", _, Some("batch")) => {
            handlers::not_implemented(ctx)
        }
        _ => Err(StorageError::new(ErrorCode::UnsupportedHttpVerb)),
    }
}

/// Routes container-level requests.
async fn route_container_request(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    match (ctx.method.as_str(), ctx.restype(), ctx.comp()) {
        ("PUT", Some("container"), None) => handlers::create_container(ctx, state).await,
        ("DELETE", Some("container"), None) => handlers::delete_container(ctx, state).await,
        ("GET" | "HEAD", Some("container"), None) => {
            handlers::get_container_properties(ctx, state).await
        }
        ("PUT", Some("container"), Some("metadata")) => {
            handlers::set_container_metadata(ctx, state).await
        }
        ("GET" | "HEAD", Some("container"), Some("acl")) => {
            handlers::get_container_acl(ctx, state).await
        }
        ("PUT", Some("container"), Some("acl")) => {
            handlers::set_container_acl(ctx, state, body).await
        }
        ("PUT", Some("container"), Some("lease")) => handlers::container_lease(ctx, state).await,
        ("GET", Some("container"), Some("list")) => handlers::list_blobs(ctx, state).await,
        ("PUT", Some("container"), Some("undelete")) | ("POST", Some("container"), Some("batch")) => {
            handlers::not_implemented(ctx)
        }
        _ => Err(StorageError::new(ErrorCode::UnsupportedHttpVerb)),
    }
}

/// Routes blob-level requests.
async fn route_blob_request(
    ctx: &RequestContext,
    state: &AppState,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    match (ctx.method.as_str(), ctx.comp()) {
        ("GET", None) => handlers::download_blob(ctx, state).await,
        ("HEAD", None) => handlers::get_blob_properties(ctx, state).await,
        ("DELETE", None) => handlers::delete_blob(ctx, state).await,
        ("PUT", None) if ctx.copy_source().is_some() => handlers::copy_blob(ctx, state).await,
        ("PUT", None) => handlers::upload_blob(ctx, state, body).await,
        ("GET" | "HEAD", Some("metadata")) => handlers::get_blob_metadata(ctx, state).await,
        ("PUT", Some("metadata")) => handlers::set_blob_metadata(ctx, state).await,
        ("PUT", Some("snapshot")) => handlers::create_snapshot(ctx, state).await,
        ("PUT", Some("lease")) => handlers::blob_lease(ctx, state).await,
        ("PUT", Some("tier" | "undelete" | "immutabilityPolicy" | "legalhold"))
        | ("DELETE", Some("immutabilityPolicy")) => handlers::not_implemented(ctx),
        _ => Err(StorageError::new(ErrorCode::UnsupportedHttpVerb)),
    }
}
