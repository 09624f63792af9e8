//! HTTP middleware
//!
//! Request correlation and timing for every route.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

use super::extractors::{REQUEST_ID_HEADER, RequestId};

pub const PROCESSING_TIME_HEADER: &str = "x-processing-time-ms";

/// Request context middleware
///
/// Adopts the caller's `X-Request-ID` or generates one, makes it available
/// to handlers through [`RequestId`], logs start and completion, and echoes
/// the id plus the elapsed time on the response.
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let start = Instant::now();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();

    info!(
        method = %method,
        path = %path,
        request_id = %request_id,
        user_agent = %user_agent,
        "HTTP request started"
    );

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();

    if status >= 400 {
        warn!(
            method = %method,
            path = %path,
            status = status,
            request_id = %request_id,
            processing_time_ms = elapsed_ms,
            "HTTP request completed with error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status,
            request_id = %request_id,
            processing_time_ms = elapsed_ms,
            "HTTP request completed"
        );
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms:.2}")) {
        headers.insert(HeaderName::from_static(PROCESSING_TIME_HEADER), value);
    }

    response
}
