//! HTTP routes of the gateway.
//!
//! - `POST /api/kubernetes/request`: forward one request to the cluster API
//! - `POST /api/kubernetes/exec`: register an exec session
//! - `POST /api/kubernetes/logs`: register a log session
//! - `GET /api/kubernetes/logs/:id`: consume a log session as a byte stream
//! - `GET /health`: liveness and session counts

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use protocol::{ApiRequest, ApiResponse, HealthResponse, SessionResponse};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use crate::cluster::{ClientBuilder, ClusterRegistry, WebSocketExecTransport};
use crate::config::Config;
use crate::session::SessionBridge;

/// Shared state of every handler.
pub struct AppState {
    pub config: Config,
    pub clusters: ClusterRegistry,
    pub bridge: SessionBridge<WebSocketExecTransport>,
}

/// Builds the full router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/kubernetes", kubernetes_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn kubernetes_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/request", post(forward_request))
        .route("/exec", post(start_exec))
        .route("/logs", post(register_logs))
        .route("/logs/:id", get(stream_logs))
}

/// Decodes a setup body. An empty body is a client error; anything
/// undecodable is reported as a server error.
fn decode_request(body: &[u8]) -> Result<ApiRequest, ApiError> {
    if body.is_empty() {
        return Err(ApiError::EmptyBody);
    }
    serde_json::from_slice(body).map_err(ApiError::Decode)
}

async fn forward_request(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ApiResponse>, ApiError> {
    let request = decode_request(&body)?;
    let client = state
        .clusters
        .build(&request.cluster, state.bridge.exec_timeout_for(&request))
        .map_err(ApiError::Client)?;

    let mut data = client
        .request(&request.method, &request.url, &request.body)
        .await
        .map_err(ApiError::Upstream)?;
    if data.ends_with('\n') {
        data.pop();
    }

    Ok(Json(ApiResponse { data }))
}

async fn start_exec(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SessionResponse>, ApiError> {
    let request = decode_request(&body)?;
    let client = state
        .clusters
        .build(&request.cluster, state.bridge.exec_timeout_for(&request))
        .map_err(ApiError::Client)?;

    let id = state.bridge.start_exec_session(request, client)?;
    Ok(Json(SessionResponse { id }))
}

async fn register_logs(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SessionResponse>, ApiError> {
    let request = decode_request(&body)?;
    let client = state
        .clusters
        .build(&request.cluster, state.bridge.options().log_timeout)
        .map_err(ApiError::Client)?;

    let id = state.bridge.register_log_session(&request, client)?;
    Ok(Json(SessionResponse { id }))
}

async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = state
        .bridge
        .take_log_session(&id)
        .ok_or_else(|| ApiError::SessionNotFound(id.clone()))?;

    let upstream = session
        .client()
        .stream(session.url())
        .await
        .map_err(ApiError::Upstream)?;

    tracing::info!(session_id = %id, url = %session.url(), "Streaming log session");

    // Long-lived tails must not hold up graceful shutdown.
    let stream = upstream
        .bytes_stream()
        .take_until(state.bridge.shutdown_token().cancelled_owned());

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        terminal_sessions: state.bridge.terminals().len(),
        log_sessions: state.bridge.logs().len(),
    })
}
