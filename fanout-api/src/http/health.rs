//! Health check and statistics endpoints

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use fanout_sfu::SfuStats;

use crate::http::AppState;

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}

/// Basic health check (always returns OK if server is running)
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Snapshot of SFU counters
pub async fn stats(State(state): State<AppState>) -> Json<SfuStats> {
    Json(state.manager.stats().await)
}
