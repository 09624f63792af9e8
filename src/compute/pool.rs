//! Bounded dispatch of blocking compute calls

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{ComputeEngine, FeatureSummary};
use crate::config::ComputeConfig;
use crate::errors::{AppError, AppResult, ComputeError};

/// Runs engine calls on the blocking thread pool, at most `workers` at a
/// time. Callers beyond that queue on the semaphore.
#[derive(Clone)]
pub struct WorkerPool {
    engine: Arc<dyn ComputeEngine>,
    permits: Arc<Semaphore>,
    workers: usize,
    timeout: Option<Duration>,
}

impl WorkerPool {
    pub fn new(engine: Arc<dyn ComputeEngine>, workers: usize, timeout: Option<Duration>) -> Self {
        let workers = workers.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            timeout,
        }
    }

    pub fn from_config(engine: Arc<dyn ComputeEngine>, config: &ComputeConfig) -> Self {
        Self::new(engine, config.workers, config.timeout)
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Permits not currently held by a running job
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `process` for the staged file at `path`.
    ///
    /// With a timeout configured, the deadline covers queueing and
    /// execution. A job that overruns keeps running in the background and
    /// holds its permit until it finishes.
    pub async fn process(&self, path: PathBuf) -> AppResult<FeatureSummary> {
        let started = Instant::now();
        let job = Self::run(self.engine.clone(), self.permits.clone(), path);

        let summary = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, job)
                .await
                .map_err(|_| {
                    warn!("Feature computation exceeded {:?}", limit);
                    AppError::ComputeTimeout { timeout: limit }
                })??,
            None => job.await?,
        };

        debug!(
            "Computed {} keypoints in {:.2}ms",
            summary.keypoints,
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(summary)
    }

    async fn run(
        engine: Arc<dyn ComputeEngine>,
        permits: Arc<Semaphore>,
        path: PathBuf,
    ) -> Result<FeatureSummary, ComputeError> {
        let permit = permits
            .acquire_owned()
            .await
            .map_err(|_| ComputeError::PoolClosed)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.process(&path)
        })
        .await?
    }

    /// Warm the engine up on the blocking pool, bounded by `limit`
    pub async fn warmup(&self, limit: Duration) -> AppResult<()> {
        let engine = self.engine.clone();
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            limit,
            tokio::task::spawn_blocking(move || engine.warmup()),
        )
        .await
        .map_err(|_| AppError::ComputeTimeout { timeout: limit })?;

        outcome.map_err(ComputeError::from)??;
        info!(
            "Compute engine warmed up in {:.2}s",
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Stop admitting new jobs; queued callers fail with `PoolClosed`
    pub fn close(&self) {
        self.permits.close();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("available", &self.available())
            .field("timeout", &self.timeout)
            .finish()
    }
}
