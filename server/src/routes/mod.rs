//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The sync engine exposes exactly two HTTP endpoints: the WebSocket upgrade
//! and a health probe. The CRUD API for boards, lists and cards lives in a
//! separate service that shares the same database; clients relay its mutation
//! notifications through the socket.

pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
