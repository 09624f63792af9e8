/// Configuration default values
///
/// All defaults live here so they can be changed in one place.
// Service identity
pub const DEFAULT_SERVICE_NAME: &str = "Feature Detection API";

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

// Cache store defaults
pub const DEFAULT_CACHE_ENABLED: bool = true;
pub const DEFAULT_REDIS_HOST: &str = "redis";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_DB: u8 = 0;
pub const MAX_REDIS_DB: u8 = 15;
pub const DEFAULT_CACHE_TTL: &str = "1h";
pub const MIN_CACHE_TTL_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT: &str = "5s";
pub const DEFAULT_OPERATION_TIMEOUT: &str = "500ms";
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
pub const KEY_PREFIX: &str = "features";

// Image intake defaults
pub const DEFAULT_MAX_IMAGE_SIZE_MB: u64 = 10;
pub const MAX_IMAGE_SIZE_LIMIT_MB: u64 = 100;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];
pub const DEFAULT_STAGING_DIR: &str = "./data/uploads";
pub const DEFAULT_ORPHAN_RETENTION: &str = "15m";

// Compute defaults
pub const DEFAULT_COMPUTE_WORKERS: usize = 4;
pub const MAX_COMPUTE_WORKERS: usize = 16;
pub const DEFAULT_WARMUP_TIMEOUT: &str = "10s";
pub const DEFAULT_MAX_FEATURES: usize = 5000;
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
pub const DEFAULT_DESCRIPTOR_SIZE: u64 = 128;

// Pipeline defaults
pub const DEFAULT_SINGLE_FLIGHT: bool = false;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
