//! HTTP response bodies and error mapping
//!
//! Every endpoint answers with JSON. Failures share one envelope carrying
//! the stable error code, a message, structured details and the request id.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::errors::{AppError, ErrorCategory, ErrorDetails};
use crate::pipeline::DetectionResult;

/// Body of a successful detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub success: bool,
    pub keypoints: u64,
    pub descriptors_shape: (u64, u64),
    pub cached: bool,
    pub processing_time_ms: f64,
    pub request_id: String,
}

impl DetectionResponse {
    pub fn new(result: DetectionResult, request_id: String) -> Self {
        Self {
            success: true,
            keypoints: result.keypoints,
            descriptors_shape: result.descriptor_shape,
            cached: result.cached,
            processing_time_ms: (result.processing_time_ms * 100.0).round() / 100.0,
            request_id,
        }
    }
}

/// Shared error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error_code: String,
    pub message: String,
    pub details: ErrorDetails,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub feature_detector_ready: bool,
    pub cache_connected: bool,
    pub uptime_seconds: f64,
}

/// HTTP status for each error kind
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::InvalidImage { .. } => StatusCode::BAD_REQUEST,
        AppError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AppError::ServiceNotReady | AppError::CacheUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AppError::ComputeTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AppError::ImageStagingFailed { .. }
        | AppError::ComputeFailed { .. }
        | AppError::Configuration { .. }
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An [`AppError`] bound to the request it failed
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error: AppError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);

        // Internal failures are logged in full; callers get the opaque message
        match self.error.category() {
            ErrorCategory::Internal => error!(
                request_id = %self.request_id,
                error_code = self.error.code(),
                "Request failed: {}",
                self.error
            ),
            _ => warn!(
                request_id = %self.request_id,
                error_code = self.error.code(),
                "Request rejected: {}",
                self.error
            ),
        }

        let body = ErrorResponse {
            success: false,
            error_code: self.error.code().to_string(),
            message: self.error.public_message(),
            details: self.error.details(),
            request_id: self.request_id,
        };

        (status, Json(body)).into_response()
    }
}
