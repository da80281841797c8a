use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;

/// Health check endpoint - returns relay status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    Json(serde_json::json!({
        "status": "alive",
        "uptime_secs": snapshot.uptime_secs,
        "requests_in_flight": snapshot
            .requests
            .started
            .saturating_sub(snapshot.requests.completed)
            .saturating_sub(snapshot.requests.failed)
            .saturating_sub(snapshot.requests.client_disconnects),
    }))
}

/// Metrics endpoint - returns detailed relay metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
