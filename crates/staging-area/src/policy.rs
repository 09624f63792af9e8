//! Retention policy for orphaned staged files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a staged file may live before the sweep removes it.
///
/// Staged files are normally removed by their owner within seconds. The
/// retention window only matters for files that were leaked, so it should be
/// comfortably longer than the slowest request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Age after which a file is eligible for removal
    pub retention_duration: Duration,
    /// Whether the sweep runs at all
    pub enabled: bool,
}

impl RetentionPolicy {
    /// Default: one hour retention, enabled.
    pub fn new() -> Self {
        Self {
            retention_duration: Duration::from_secs(60 * 60),
            enabled: true,
        }
    }

    /// Set the retention duration.
    #[must_use]
    pub fn remove_after(mut self, duration: Duration) -> Self {
        self.retention_duration = duration;
        self
    }

    /// Enable or disable sweeping.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Never sweep.
    pub fn disabled() -> Self {
        Self {
            retention_duration: Duration::ZERO,
            enabled: false,
        }
    }

    /// Sweep interval that keeps drift well under the retention window.
    ///
    /// - up to 10 minutes retention: every 30 seconds
    /// - up to 1 hour: every minute
    /// - up to 1 day: every 10 minutes
    /// - longer: hourly
    pub fn recommended_sweep_interval(&self) -> Duration {
        match self.retention_duration.as_secs() {
            0..=600 => Duration::from_secs(30),
            601..=3600 => Duration::from_secs(60),
            3601..=86400 => Duration::from_secs(600),
            _ => Duration::from_secs(3600),
        }
    }

    /// Whether a file staged at `staged_at` (or last modified at `modified`,
    /// whichever is later) has outlived the window.
    pub fn is_expired(&self, staged_at: DateTime<Utc>, modified: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        let cutoff =
            Utc::now() - chrono::Duration::from_std(self.retention_duration).unwrap_or_default();

        staged_at.max(modified) < cutoff
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new()
    }
}
