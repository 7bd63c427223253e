//! HTTP surface: router, handlers and request logging.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::services::key_listing::{KeyListingGateway, ListMode};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<KeyListingGateway>,
}

#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    #[serde(rename = "async", default)]
    pub is_async: bool,
}

pub fn build_router(gateway: Arc<KeyListingGateway>) -> Router {
    Router::new()
        .route("/key_vault/list_keys", get(handle_list_keys))
        .route("/kv/sync", get(handle_kv_sync))
        .route("/kv/async", get(handle_kv_async))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(AppState { gateway })
}

/// Binds `addr` and serves `app` until Ctrl+C.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server accepting connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn handle_list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> String {
    state
        .gateway
        .list_keys(ListMode::from_flag(query.is_async))
        .await
}

async fn handle_kv_sync(State(state): State<AppState>) -> String {
    state.gateway.log_keys(ListMode::Sync).await
}

async fn handle_kv_async(State(state): State<AppState>) -> String {
    state.gateway.log_keys(ListMode::Async).await
}

async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status.is_client_error() || status.is_server_error() {
        warn!(target: "http", %method, %path, status = status.as_u16(), duration_ms, "Request rejected");
    } else {
        info!(target: "http", %method, %path, status = status.as_u16(), duration_ms, "Request served");
    }
    response
}
