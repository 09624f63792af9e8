use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use defaults::*;

/// Prefix for environment overrides, e.g. `FEATURE_CACHE_CACHE__TTL=30m`.
pub const ENV_PREFIX: &str = "FEATURE_CACHE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheBackend {
    /// Remote Redis store, the production setup
    Redis,
    /// In-process LRU, for local runs without Redis
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default = "default_redis_db")]
    pub db: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Entry lifetime; must be at least a minute
    #[serde(default = "default_cache_ttl", with = "duration_serde::duration")]
    pub ttl: Duration,
    #[serde(default = "default_connect_timeout", with = "duration_serde::duration")]
    pub connect_timeout: Duration,
    /// Deadline for each get/set/ping once connected; a store that stops
    /// answering degrades to misses instead of stalling requests
    #[serde(default = "default_operation_timeout", with = "duration_serde::duration")]
    pub operation_timeout: Duration,
    /// Entry limit for the memory backend
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_max_image_size_mb")]
    pub max_size_mb: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Staged files older than this are swept. A request queued for compute
    /// longer than this loses its file, so it must exceed `compute.timeout`.
    #[serde(default = "default_orphan_retention", with = "duration_serde::duration")]
    pub orphan_retention: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Size of the blocking worker pool
    #[serde(default = "default_compute_workers")]
    pub workers: usize,
    #[serde(default = "default_warmup_timeout", with = "duration_serde::duration")]
    pub warmup_timeout: Duration,
    /// Per-request deadline for a computation; unset means wait indefinitely
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_serde::option_duration"
    )]
    pub timeout: Option<Duration>,
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// Longest image side fed to the detector; larger images are downscaled
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Collapse concurrent misses for the same key onto one computation
    #[serde(default = "default_single_flight")]
    pub single_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_environment() -> Environment {
    Environment::Production
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cache_enabled() -> bool {
    DEFAULT_CACHE_ENABLED
}

fn default_cache_backend() -> CacheBackend {
    CacheBackend::Redis
}

fn default_redis_host() -> String {
    DEFAULT_REDIS_HOST.to_string()
}

fn default_redis_port() -> u16 {
    DEFAULT_REDIS_PORT
}

fn default_redis_db() -> u8 {
    DEFAULT_REDIS_DB
}

fn parse_default_duration(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or_default()
}

fn default_cache_ttl() -> Duration {
    parse_default_duration(DEFAULT_CACHE_TTL)
}

fn default_connect_timeout() -> Duration {
    parse_default_duration(DEFAULT_CONNECT_TIMEOUT)
}

fn default_operation_timeout() -> Duration {
    parse_default_duration(DEFAULT_OPERATION_TIMEOUT)
}

fn default_memory_capacity() -> usize {
    DEFAULT_MEMORY_CAPACITY
}

fn default_max_image_size_mb() -> u64 {
    DEFAULT_MAX_IMAGE_SIZE_MB
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STAGING_DIR)
}

fn default_orphan_retention() -> Duration {
    parse_default_duration(DEFAULT_ORPHAN_RETENTION)
}

fn default_compute_workers() -> usize {
    DEFAULT_COMPUTE_WORKERS
}

fn default_warmup_timeout() -> Duration {
    parse_default_duration(DEFAULT_WARMUP_TIMEOUT)
}

fn default_max_features() -> usize {
    DEFAULT_MAX_FEATURES
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_single_flight() -> bool {
    DEFAULT_SINGLE_FLIGHT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            environment: default_environment(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            backend: default_cache_backend(),
            host: default_redis_host(),
            port: default_redis_port(),
            db: default_redis_db(),
            password: None,
            ttl: default_cache_ttl(),
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_image_size_mb(),
            allowed_extensions: default_allowed_extensions(),
            staging_dir: default_staging_dir(),
            orphan_retention: default_orphan_retention(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            workers: default_compute_workers(),
            warmup_timeout: default_warmup_timeout(),
            timeout: None,
            max_features: default_max_features(),
            max_dimension: default_max_dimension(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            single_flight: default_single_flight(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            web: WebConfig::default(),
            cache: CacheConfig::default(),
            images: ImageConfig::default(),
            compute: ComputeConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CacheConfig {
    /// `redis://[:password@]host:port/db`
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl ImageConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    /// Defaults, then the TOML file, then `FEATURE_CACHE_*` environment
    /// variables. Writes a default file first when none exists.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if !Path::new(config_file).exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(config_file, contents)
                .with_context(|| format!("Failed to write default config to {config_file}"))?;
            info!("Created default config file: {}", config_file);
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {config_file}"))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.cache.ttl.as_secs() < MIN_CACHE_TTL_SECS {
            return Err(AppError::configuration(format!(
                "cache.ttl must be at least {}s, got {}s",
                MIN_CACHE_TTL_SECS,
                self.cache.ttl.as_secs()
            )));
        }

        if self.cache.db > MAX_REDIS_DB {
            return Err(AppError::configuration(format!(
                "cache.db must be between 0 and {}, got {}",
                MAX_REDIS_DB, self.cache.db
            )));
        }

        if self.cache.operation_timeout.is_zero() {
            return Err(AppError::configuration("cache.operation_timeout must be positive"));
        }

        if self.cache.memory_capacity == 0 {
            return Err(AppError::configuration("cache.memory_capacity must be positive"));
        }

        if !(1..=MAX_IMAGE_SIZE_LIMIT_MB).contains(&self.images.max_size_mb) {
            return Err(AppError::configuration(format!(
                "images.max_size_mb must be between 1 and {}, got {}",
                MAX_IMAGE_SIZE_LIMIT_MB, self.images.max_size_mb
            )));
        }

        if self.images.allowed_extensions.is_empty() {
            return Err(AppError::configuration(
                "images.allowed_extensions must list at least one extension",
            ));
        }

        if !(1..=MAX_COMPUTE_WORKERS).contains(&self.compute.workers) {
            return Err(AppError::configuration(format!(
                "compute.workers must be between 1 and {}, got {}",
                MAX_COMPUTE_WORKERS, self.compute.workers
            )));
        }

        if let Some(timeout) = self
            .compute
            .timeout
            .filter(|timeout| self.images.orphan_retention <= *timeout)
        {
            return Err(AppError::configuration(format!(
                "images.orphan_retention ({}) must exceed compute.timeout ({})",
                humantime::format_duration(self.images.orphan_retention),
                humantime::format_duration(timeout)
            )));
        }

        if self.compute.max_features == 0 || self.compute.max_dimension == 0 {
            return Err(AppError::configuration(
                "compute.max_features and compute.max_dimension must be positive",
            ));
        }

        Ok(())
    }
}
