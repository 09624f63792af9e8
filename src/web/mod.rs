//! Web layer module
//!
//! HTTP interface for the feature cache. Handlers stay thin: they extract
//! the upload and correlation id, then hand off to the pipeline.
//!
//! # Routes
//!
//! - `POST /api/v1/features/detect`: multipart upload, field `image`
//! - `GET /health`, `GET /ready`, `GET /live`: probes
//! - `GET /`: service information

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderName,
    middleware as axum_middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::pipeline::FeaturePipeline;

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod responses;

pub use extractors::RequestId;
pub use responses::{ApiError, DetectionResponse, ErrorResponse, HealthResponse};

/// Room for multipart boundaries and part headers on top of the image
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: FeaturePipeline,
    pub config: Arc<Config>,
    /// Application start time for uptime calculation
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(pipeline: FeaturePipeline, config: Arc<Config>) -> Self {
        Self {
            pipeline,
            config,
            start_time: chrono::Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        let elapsed = chrono::Utc::now() - self.start_time;
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr =
            format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Serve until `cancellation_token` fires, then drain in-flight requests.
    /// `ready_signal` reports whether the listener bound.
    pub async fn serve_with_cancellation(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
        cancellation_token: CancellationToken,
    ) -> Result<()> {
        match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => {
                let _ = ready_signal.send(Ok(()));
                tracing::info!("Listening on http://{}", self.addr);

                axum::serve(listener, self.app)
                    .with_graceful_shutdown(async move {
                        cancellation_token.cancelled().await;
                        tracing::info!("Web server received cancellation signal, shutting down gracefully");
                    })
                    .await?;
                Ok(())
            }
            Err(bind_error) => {
                let message = format!("Failed to bind to {}: {}", self.addr, bind_error);
                let _ = ready_signal.send(Err(anyhow::anyhow!("{}", message)));
                Err(anyhow::anyhow!("{}", message))
            }
        }
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.images.max_size_bytes() as usize + MULTIPART_OVERHEAD_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(extractors::REQUEST_ID_HEADER),
            HeaderName::from_static(middleware::PROCESSING_TIME_HEADER),
        ]);

    Router::new()
        .route("/", get(handlers::index::index))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/live", get(handlers::health::liveness_check))
        .nest("/api/v1", api_v1_routes(body_limit))
        .layer(axum_middleware::from_fn(
            middleware::request_context_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

fn api_v1_routes(body_limit: usize) -> Router<AppState> {
    Router::new().route(
        "/features/detect",
        post(handlers::features::detect_features).layer(DefaultBodyLimit::max(body_limit)),
    )
}
