//! Feature detection endpoint

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, StatusCode, header::CONTENT_LENGTH},
};
use bytes::Bytes;
use tracing::info;

use crate::errors::AppError;
use crate::web::{
    AppState,
    extractors::RequestId,
    responses::{ApiError, DetectionResponse},
};

/// Multipart field carrying the upload
pub const IMAGE_FIELD: &str = "image";

struct Upload {
    filename: Option<String>,
    bytes: Bytes,
}

/// POST /api/v1/features/detect
///
/// Runs the upload through the pipeline on its own task, so a client that
/// disconnects mid-computation still leaves a populated cache behind.
pub async fn detect_features(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let request_id = request_id.0;
    let fail = |error: AppError| ApiError::new(error, request_id.clone());

    let multipart = multipart.map_err(|e| {
        fail(AppError::invalid_image(format!(
            "Expected a multipart/form-data upload: {e}"
        )))
    })?;

    let upload = read_upload(multipart, &headers, state.config.images.max_size_mb)
        .await
        .map_err(fail)?;

    info!(
        request_id = %request_id,
        "Feature detection request received: {} ({} bytes)",
        upload.filename.as_deref().unwrap_or("<unnamed>"),
        upload.bytes.len()
    );

    let pipeline = state.pipeline.clone();
    let task_request_id = request_id.clone();
    let result = tokio::spawn(async move {
        pipeline
            .handle(upload.bytes, upload.filename.as_deref(), &task_request_id)
            .await
    })
    .await
    .map_err(|e| fail(AppError::internal(format!("detection task failed: {e}"))))?
    .map_err(fail)?;

    Ok(Json(DetectionResponse::new(result, request_id)))
}

async fn read_upload(
    mut multipart: Multipart,
    headers: &HeaderMap,
    max_size_mb: u64,
) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, headers, max_size_mb))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, headers, max_size_mb))?;

        return Ok(Upload { filename, bytes });
    }

    Err(AppError::invalid_image(format!(
        "Missing multipart field '{IMAGE_FIELD}'"
    )))
}

/// Body limit hits become `ImageTooLarge`, sized from `Content-Length` when
/// the client declared one. Chunked uploads report the limit only.
fn multipart_error(error: MultipartError, headers: &HeaderMap, max_size_mb: u64) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return match declared_length(headers) {
            Some(length) if length > max_size_mb * 1024 * 1024 => {
                AppError::image_too_large(length, max_size_mb)
            }
            _ => AppError::image_too_large_unsized(max_size_mb),
        };
    }

    AppError::invalid_image(format!("Malformed multipart body: {}", error.body_text()))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
}
