//! HTTP surface: router and WebSocket endpoints.

mod routes;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::services::ServeFile;

use crate::relay::RelayState;

/// Shared app state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayState>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route_service("/", ServeFile::new("static/index.html"))
        .route("/health", get(health))
        .route("/upload", get(routes::upload_handler))
        .route("/download", get(routes::download_handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
