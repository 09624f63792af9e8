//! Feature computation
//!
//! The pipeline sees an engine only through [`ComputeEngine`]: a readiness
//! flag plus a blocking `process` call. [`WorkerPool`] moves those calls off
//! the async workers and bounds how many run at once.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod detector;
pub mod pool;

pub use detector::{DetectorSettings, GradientDetector};
pub use pool::WorkerPool;

use crate::errors::ComputeResult;

/// Outcome of a detection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub keypoints: u64,
    /// `(rows, cols)` of the descriptor matrix
    pub descriptor_shape: (u64, u64),
}

/// A CPU-bound feature detector.
///
/// `warmup` and `process` block the calling thread; call them through a
/// [`WorkerPool`].
#[cfg_attr(test, mockall::automock)]
pub trait ComputeEngine: Send + Sync + 'static {
    /// Read on every request, never cached by callers
    fn is_ready(&self) -> bool;

    /// One-off initialisation; the engine reports ready once this succeeds
    fn warmup(&self) -> ComputeResult<()>;

    fn process(&self, path: &Path) -> ComputeResult<FeatureSummary>;
}
