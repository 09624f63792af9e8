//! Root endpoint

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::web::AppState;

/// Service name, version and where to look next
pub async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": state.config.service.name,
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.service.environment.to_string(),
        "health": "/health",
        "detect": "/api/v1/features/detect",
    }))
}
