//! Request orchestration
//!
//! `handle` runs one upload through: readiness gate, staging, cache lookup,
//! computation on a miss, write-back, and release of the staged file. The
//! staged file is released exactly once whatever the outcome.

use bytes::Bytes;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub mod guard;
pub mod single_flight;

pub use guard::StagingGuard;
pub use single_flight::{Flight, SingleFlight};

use crate::cache::{CacheEntry, FeatureCache};
use crate::compute::{FeatureSummary, WorkerPool};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::staging::{ImageStager, StagedImage};

/// Response-level result for one upload
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionResult {
    pub keypoints: u64,
    pub descriptor_shape: (u64, u64),
    /// Served from the cache rather than computed for this request
    pub cached: bool,
    /// Wall-clock time of this request, never the original computation's
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub single_flight: bool,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            cache_enabled: config.cache.enabled,
            cache_ttl: config.cache.ttl,
            single_flight: config.pipeline.single_flight,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeaturePipeline {
    stager: ImageStager,
    cache: FeatureCache,
    pool: WorkerPool,
    settings: PipelineSettings,
    flights: Option<SingleFlight<FeatureSummary>>,
}

impl FeaturePipeline {
    pub fn new(
        stager: ImageStager,
        cache: FeatureCache,
        pool: WorkerPool,
        settings: PipelineSettings,
    ) -> Self {
        let flights = settings.single_flight.then(SingleFlight::new);
        Self {
            stager,
            cache,
            pool,
            settings,
            flights,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pool.is_ready()
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    pub fn stager(&self) -> &ImageStager {
        &self.stager
    }

    /// Detect features for one upload.
    ///
    /// Fails with `ServiceNotReady` before any I/O while the engine warms
    /// up. Cache failures never fail the request.
    pub async fn handle(
        &self,
        bytes: Bytes,
        filename: Option<&str>,
        request_id: &str,
    ) -> AppResult<DetectionResult> {
        let started = Instant::now();

        if !self.pool.is_ready() {
            warn!(request_id = %request_id, "Compute engine not ready, rejecting request");
            return Err(AppError::ServiceNotReady);
        }

        let staged = self.stager.validate_and_stage(bytes, filename).await?;
        let guard = StagingGuard::new(self.stager.clone(), staged.clone());

        let outcome = self.detect_staged(&staged, request_id).await;
        guard.release().await;

        let (summary, cached) = outcome?;
        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            request_id = %request_id,
            "Detected {} keypoints (cached: {}) in {:.2}ms",
            summary.keypoints, cached, processing_time_ms
        );

        Ok(DetectionResult {
            keypoints: summary.keypoints,
            descriptor_shape: summary.descriptor_shape,
            cached,
            processing_time_ms,
        })
    }

    async fn detect_staged(
        &self,
        staged: &StagedImage,
        request_id: &str,
    ) -> AppResult<(FeatureSummary, bool)> {
        let key = self.stager.cache_key_for(staged).await;

        if self.settings.cache_enabled {
            if let Some(entry) = self.cache.get::<CacheEntry>(&key).await {
                debug!(request_id = %request_id, "Cache hit for {}", key);
                return Ok((entry.into(), true));
            }
            debug!(request_id = %request_id, "Cache miss for {}", key);
        }

        let summary = match &self.flights {
            Some(flights) => match flights.join(&key) {
                Flight::Leader(leader) => {
                    let summary = self.compute_and_store(staged, &key, request_id).await?;
                    leader.complete(summary);
                    summary
                }
                Flight::Follower(follower) => match follower.wait().await {
                    Some(summary) => {
                        debug!(request_id = %request_id, "Joined in-flight computation for {}", key);
                        summary
                    }
                    None => self.compute_and_store(staged, &key, request_id).await?,
                },
            },
            None => self.compute_and_store(staged, &key, request_id).await?,
        };

        Ok((summary, false))
    }

    async fn compute_and_store(
        &self,
        staged: &StagedImage,
        key: &str,
        request_id: &str,
    ) -> AppResult<FeatureSummary> {
        let summary = self
            .pool
            .process(staged.path.clone())
            .await
            .inspect_err(|e| {
                warn!(request_id = %request_id, "Computation for {} failed: {}", staged.name, e)
            })?;

        if self.settings.cache_enabled {
            let entry = CacheEntry::from(summary);
            if !self.cache.set(key, &entry, Some(self.settings.cache_ttl)).await {
                warn!(request_id = %request_id, "Write-back for {} failed, result not cached", key);
            }
        }

        Ok(summary)
    }
}
