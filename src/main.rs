use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feature_cache::{
    cache::FeatureCache,
    compute::{DetectorSettings, GradientDetector, WorkerPool},
    config::{CacheBackend, Config, LogFormat, LoggingConfig},
    pipeline::{FeaturePipeline, PipelineSettings},
    staging::ImageStager,
    web::{AppState, WebServer},
};
use staging_area::{RetentionPolicy, StagingArea};

#[derive(Parser)]
#[command(name = "feature-cache")]
#[command(version)]
#[command(about = "Content-addressed caching service for image feature detection")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (defaults to $CONFIG_FILE, then config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Cache backend: redis or memory
    #[arg(long, value_name = "BACKEND")]
    cache_backend: Option<CacheBackend>,

    /// Log level or filter directive
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Log format: json or console
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.web.host = host;
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(backend) = self.cache_backend {
            config.cache.backend = backend;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let level = &logging.level;
    let default_filter = if level.contains('=') {
        level.clone()
    } else {
        format!("feature_cache={level},staging_area={level},tower_http=info")
    };

    let json_layer = (logging.format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().with_current_span(false));
    let console_layer =
        (logging.format == LogFormat::Console).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(json_layer)
        .with(console_layer)
        .init();
}

/// Cancel `token` on SIGTERM or Ctrl+C
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
                    }
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down gracefully");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down gracefully");
        }

        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };
    cli.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging);
    info!(
        "Starting {} v{} ({})",
        config.service.name,
        env!("CARGO_PKG_VERSION"),
        config.service.environment
    );
    let config = Arc::new(config);

    let area = StagingArea::builder()
        .base_directory(&config.images.staging_dir)
        .retention(RetentionPolicy::new().remove_after(config.images.orphan_retention))
        .build()
        .await
        .with_context(|| {
            format!(
                "Failed to prepare staging directory {}",
                config.images.staging_dir.display()
            )
        })?;
    info!("Staging area ready at {}", area.base_directory().display());
    let stager = ImageStager::new(area.clone(), &config.images);

    // Unreachable cache at startup is fatal; later outages only degrade
    let cache = FeatureCache::connect(&config.cache)
        .await
        .context("Cache store unavailable at startup")?;

    let detector = Arc::new(GradientDetector::new(DetectorSettings::from(&config.compute)));
    let pool = WorkerPool::from_config(detector, &config.compute);
    info!("Compute pool started with {} workers", pool.workers());

    let pipeline = FeaturePipeline::new(
        stager,
        cache.clone(),
        pool.clone(),
        PipelineSettings::from(config.as_ref()),
    );
    let web_server = WebServer::new(AppState::new(pipeline, config.clone()))?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(web_server.serve_with_cancellation(ready_tx, shutdown.clone()));
    ready_rx
        .await
        .context("Web server exited before binding")??;

    // Traffic is answered with SERVICE_NOT_READY until this completes
    let warmup = pool.warmup(config.compute.warmup_timeout).await;
    if let Err(e) = &warmup {
        error!("Compute engine warmup failed: {}", e);
        shutdown.cancel();
    }

    let served = server.await.context("Web server task panicked")?;

    pool.close();
    area.shutdown().await;
    cache.disconnect().await;
    info!("Shutdown complete");

    warmup?;
    served
}
