//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use feature_cache::cache::{CacheStore, FeatureCache, MemoryStore};
use feature_cache::compute::{ComputeEngine, FeatureSummary, WorkerPool};
use feature_cache::config::ImageConfig;
use feature_cache::errors::{CacheError, CacheResult, ComputeError, ComputeResult};
use feature_cache::pipeline::{FeaturePipeline, PipelineSettings};
use feature_cache::staging::ImageStager;
use staging_area::{RetentionPolicy, StagingArea};

/// Deterministic noisy RGB PNG; different seeds give different bytes
pub fn png_bytes(width: u32, height: u32, seed: u32) -> Bytes {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    let image = image::RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        image::Rgb([r, g, b])
    });

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encoding");
    Bytes::from(out.into_inner())
}

/// Engine double: keypoints derive from the staged file's size
pub struct StubEngine {
    ready: AtomicBool,
    fail: AtomicBool,
    calls: AtomicUsize,
    delay: Duration,
}

impl StubEngine {
    pub fn ready() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            ready: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ComputeEngine for StubEngine {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn warmup(&self) -> ComputeResult<()> {
        self.set_ready(true);
        Ok(())
    }

    fn process(&self, path: &Path) -> ComputeResult<FeatureSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ComputeError::Detection {
                message: "stub failure".to_string(),
            });
        }

        let size = std::fs::metadata(path)
            .map_err(|e| ComputeError::Load {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
            .len();
        let keypoints = size % 997 + 1;
        Ok(FeatureSummary {
            keypoints,
            descriptor_shape: (keypoints, 128),
        })
    }
}

/// Store that is never reachable
pub struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    fn backend_name(&self) -> &'static str {
        "unreachable"
    }
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(refused())
    }
    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        Err(refused())
    }
    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        Err(refused())
    }
    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Err(refused())
    }
    async fn ping(&self) -> CacheResult<()> {
        Err(refused())
    }
    async fn disconnect(&self) {}
}

/// Store that accepts every call and never answers
pub struct StalledStore;

#[async_trait]
impl CacheStore for StalledStore {
    fn backend_name(&self) -> &'static str {
        "stalled"
    }
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        std::future::pending().await
    }
    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        std::future::pending().await
    }
    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        std::future::pending().await
    }
    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        std::future::pending().await
    }
    async fn ping(&self) -> CacheResult<()> {
        std::future::pending().await
    }
    async fn disconnect(&self) {}
}

fn refused() -> CacheError {
    CacheError::Connection {
        message: "connection refused".to_string(),
    }
}

pub fn default_settings() -> PipelineSettings {
    PipelineSettings {
        cache_enabled: true,
        cache_ttl: Duration::from_secs(3600),
        single_flight: false,
    }
}

pub struct Fixture {
    pub pipeline: FeaturePipeline,
    pub engine: Arc<StubEngine>,
    pub store: Arc<MemoryStore>,
    pub staging_dir: TempDir,
}

impl Fixture {
    pub async fn new(engine: StubEngine, settings: PipelineSettings) -> Self {
        Self::build(engine, settings, 10, None).await
    }

    /// `store` replaces the memory store behind the cache when given
    pub async fn build(
        engine: StubEngine,
        settings: PipelineSettings,
        max_size_mb: u64,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        let staging_dir = TempDir::new().expect("temp dir");
        let area = StagingArea::builder()
            .base_directory(staging_dir.path())
            .retention(RetentionPolicy::disabled())
            .build()
            .await
            .expect("staging area");
        let image_config = ImageConfig {
            max_size_mb,
            staging_dir: staging_dir.path().to_path_buf(),
            ..ImageConfig::default()
        };
        let stager = ImageStager::new(area, &image_config);

        let memory = Arc::new(MemoryStore::new(128));
        let cache = match store {
            Some(store) => FeatureCache::from_store(store),
            None => FeatureCache::from_store(memory.clone()),
        };

        let engine = Arc::new(engine);
        let pool = WorkerPool::new(engine.clone(), 2, None);

        Self {
            pipeline: FeaturePipeline::new(stager, cache, pool, settings),
            engine,
            store: memory,
            staging_dir,
        }
    }

    /// Files currently present in the staging directory
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
