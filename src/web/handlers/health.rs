//! Health check HTTP handlers
//!
//! `/health` reports component status, `/ready` gates traffic on the
//! compute engine, `/live` only proves the process answers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::web::{AppState, responses::HealthResponse};

/// Component health. Healthy needs a warmed-up engine and a cache that
/// answers a ping.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let feature_detector_ready = state.pipeline.is_ready();
    let cache_connected = state.pipeline.cache().ping().await;

    let status = if feature_detector_ready && cache_connected {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: state.config.service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        feature_detector_ready,
        cache_connected,
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Readiness probe: 503 until the engine has warmed up
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    if state.pipeline.is_ready() {
        (StatusCode::OK, Json(json!({"status": "ready"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not_ready"})),
        )
            .into_response()
    }
}

/// Liveness probe
pub async fn liveness_check() -> Json<serde_json::Value> {
    Json(json!({"status": "alive"}))
}
