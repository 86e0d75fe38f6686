//! Axum routes serving an [`RpcService`].
//!
//! ```text
//! POST /rpc     JSON-RPC 2.0 envelope in, envelope out
//! GET  /health  liveness check
//! ```
//!
//! Every envelope, including protocol errors and *payment required*, is
//! answered with HTTP 200. The status line only reflects transport problems.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use m402::codec::RpcResponse;
use m402::service::RpcService;
use serde_json::{Value, json};

/// `POST /rpc` - Handles one JSON-RPC envelope.
pub async fn post_rpc(State(service): State<RpcService>, body: Bytes) -> Json<RpcResponse> {
    Json(service.handle(&body).await)
}

/// `GET /health` - Health check endpoint.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the router for `service`.
///
/// Layers such as CORS or request tracing are left to the caller.
pub fn rpc_router(service: RpcService) -> Router {
    Router::new()
        .route("/rpc", post(post_rpc))
        .route("/health", get(health))
        .with_state(service)
}
