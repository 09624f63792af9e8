//! Core staging area implementation.

use crate::{
    error::{Result, StagingError},
    policy::RetentionPolicy,
    security::{resolve_within, set_secure_permissions},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs,
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::interval,
};
use tokio_util::sync::CancellationToken;

/// A file currently held in the staging area.
#[derive(Debug, Clone, Serialize)]
pub struct StagedFile {
    /// Name relative to the base directory
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
    pub size_bytes: u64,
    pub staged_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AreaStats {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub base_directory: PathBuf,
}

/// Snapshot entry for the first phase of a sweep.
#[derive(Debug, Clone)]
struct SweepCandidate {
    name: String,
    path: PathBuf,
    staged_at: DateTime<Utc>,
}

/// Handle to a sandboxed staging directory. Cheap to clone.
#[derive(Clone, Debug)]
pub struct StagingArea {
    base_dir: PathBuf,
    registry: Arc<RwLock<HashMap<String, StagedFile>>>,
    retention: RetentionPolicy,
    sweep_interval: Duration,
    shutdown: CancellationToken,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StagingArea {
    #[must_use]
    pub fn builder() -> StagingAreaBuilder {
        StagingAreaBuilder::new()
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_dir
    }

    /// Write `contents` under `name`, replacing any file already there.
    ///
    /// # Errors
    /// Returns an error if the name is rejected or the write fails.
    pub async fn write<N: AsRef<str>, C: AsRef<[u8]>>(
        &self,
        name: N,
        contents: C,
    ) -> Result<StagedFile> {
        let name = name.as_ref();
        let path = resolve_within(&self.base_dir, name)?;
        let contents = contents.as_ref();

        fs::write(&path, contents).await?;

        let staged = StagedFile {
            name: name.to_string(),
            path,
            size_bytes: contents.len() as u64,
            staged_at: Utc::now(),
        };

        self.registry
            .write()
            .await
            .insert(name.to_string(), staged.clone());

        Ok(staged)
    }

    /// Read a staged file back in full.
    ///
    /// # Errors
    /// Returns an error if the name is rejected or the file cannot be read.
    pub async fn read<N: AsRef<str>>(&self, name: N) -> Result<Vec<u8>> {
        let path = resolve_within(&self.base_dir, name.as_ref())?;
        Ok(fs::read(&path).await?)
    }

    /// Remove a staged file.
    ///
    /// # Errors
    /// `FileNotFound` when nothing is staged under `name`, otherwise any
    /// validation or I/O failure.
    pub async fn remove<N: AsRef<str>>(&self, name: N) -> Result<()> {
        let name = name.as_ref();
        let path = resolve_within(&self.base_dir, name)?;

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.registry.write().await.remove(name);
                return Err(StagingError::FileNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.registry.write().await.remove(name);
        Ok(())
    }

    /// # Errors
    /// Returns an error if the name is rejected.
    pub async fn exists<N: AsRef<str>>(&self, name: N) -> Result<bool> {
        let path = resolve_within(&self.base_dir, name.as_ref())?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Absolute location a name maps to, validated against the sandbox.
    ///
    /// # Errors
    /// Returns an error if the name is rejected.
    pub fn full_path<N: AsRef<str>>(&self, name: N) -> Result<PathBuf> {
        resolve_within(&self.base_dir, name.as_ref())
    }

    /// Names of all files directly inside the base directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    pub async fn stats(&self) -> AreaStats {
        let registry = self.registry.read().await;
        let total_files = registry.len();
        let total_size_bytes = registry.values().map(|f| f.size_bytes).sum();
        drop(registry);

        AreaStats {
            total_files,
            total_size_bytes,
            base_directory: self.base_dir.clone(),
        }
    }

    /// Remove files that have outlived the retention window.
    ///
    /// Phase 1 takes a snapshot under the read lock and decides; phase 2
    /// takes the write lock only for the removals.
    ///
    /// # Errors
    /// Currently infallible per file (failures are logged); kept fallible for
    /// callers that schedule it.
    pub async fn sweep_expired(&self) -> Result<usize> {
        if !self.retention.enabled {
            return Ok(0);
        }

        let snapshot: Vec<SweepCandidate> = {
            let registry = self.registry.read().await;
            registry
                .values()
                .map(|f| SweepCandidate {
                    name: f.name.clone(),
                    path: f.path.clone(),
                    staged_at: f.staged_at,
                })
                .collect()
        };

        let mut removals = Vec::new();
        for candidate in snapshot {
            let Ok(meta) = fs::metadata(&candidate.path).await else {
                // Gone already; forget it.
                removals.push((candidate.name, None));
                continue;
            };
            let modified = DateTime::from(meta.modified().unwrap_or(std::time::UNIX_EPOCH));
            if self.retention.is_expired(candidate.staged_at, modified) {
                removals.push((candidate.name, Some(candidate.path)));
            }
        }

        if removals.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut registry = self.registry.write().await;
        for (name, maybe_path) in removals {
            if let Some(path) = maybe_path {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!("Swept orphaned staged file: {}", name);
                        removed += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to sweep staged file {:?}: {}", path, e);
                    }
                }
            }
            registry.remove(&name);
        }
        drop(registry);

        if removed > 0 {
            tracing::info!("Swept {} orphaned staged files", removed);
        }
        Ok(removed)
    }

    async fn start_sweep_task(&self) {
        if !self.retention.enabled || self.sweep_interval.is_zero() {
            return;
        }

        let area = self.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(area.sweep_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = area.sweep_expired().await {
                            tracing::error!("Error during staging sweep: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Staging sweep stopped for {:?}", area.base_dir);
        });

        *self.sweeper.lock().await = Some(handle);
    }

    /// Whether the background sweep is running
    pub async fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the background sweep and wait for it to exit. Shared by all
    /// clones of this area; calling it again is a no-op.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.sweeper.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!("Staging sweep task ended abnormally: {}", e);
        }
    }

    /// Register files left behind by a previous run so the sweep sees them.
    async fn load_existing_files(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.base_dir).await?;
        let mut loaded = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                let staged_at = DateTime::from(metadata.modified().unwrap_or(std::time::UNIX_EPOCH));
                let staged = StagedFile {
                    name: name.to_string(),
                    path: path.clone(),
                    size_bytes: metadata.len(),
                    staged_at,
                };
                self.registry.write().await.insert(name.to_string(), staged);
                loaded += 1;
            }
        }

        if loaded > 0 {
            tracing::info!("Found {} leftover staged files from a previous run", loaded);
        }

        Ok(())
    }
}

/// Builder for a `StagingArea`.
pub struct StagingAreaBuilder {
    base_directory: Option<PathBuf>,
    retention: RetentionPolicy,
    sweep_interval: Option<Duration>,
}

impl StagingAreaBuilder {
    fn new() -> Self {
        Self {
            base_directory: None,
            retention: RetentionPolicy::default(),
            sweep_interval: None,
        }
    }

    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    #[must_use]
    pub fn retention(mut self, policy: RetentionPolicy) -> Self {
        self.retention = policy;
        self
    }

    /// Defaults to the policy's recommended interval.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// # Errors
    /// Returns an error if:
    /// - Base directory is not set
    /// - Base directory cannot be created or secured
    /// - Leftover files cannot be enumerated
    pub async fn build(self) -> Result<StagingArea> {
        let base_dir = self
            .base_directory
            .ok_or_else(|| StagingError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| StagingError::DirectoryCreation {
                path: base_dir.clone(),
                source: e,
            })?;

        set_secure_permissions(&base_dir).await?;

        let sweep_interval = self
            .sweep_interval
            .unwrap_or_else(|| self.retention.recommended_sweep_interval());

        let area = StagingArea {
            base_dir,
            registry: Arc::new(RwLock::new(HashMap::new())),
            retention: self.retention,
            sweep_interval,
            shutdown: CancellationToken::new(),
            sweeper: Arc::new(Mutex::new(None)),
        };

        area.load_existing_files().await?;
        area.start_sweep_task().await;

        tracing::info!(
            "StagingArea initialized - base_dir: {:?}, sweep_interval: {:?}, sweep_enabled: {}",
            area.base_dir,
            area.sweep_interval,
            area.retention.enabled
        );

        Ok(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn area_without_sweep(
        dir: &Path,
    ) -> std::result::Result<StagingArea, Box<dyn std::error::Error>> {
        Ok(StagingArea::builder()
            .base_directory(dir)
            .retention(RetentionPolicy::disabled())
            .build()
            .await?)
    }

    #[tokio::test]
    async fn test_write_read_remove() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let area = area_without_sweep(temp_dir.path()).await?;

        let staged = area.write("abc.png", b"payload").await?;
        assert_eq!(staged.size_bytes, 7);
        assert!(staged.path.exists());
        assert!(area.exists("abc.png").await?);

        assert_eq!(area.read("abc.png").await?, b"payload");

        area.remove("abc.png").await?;
        assert!(!area.exists("abc.png").await?);
        assert!(!staged.path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let temp_dir = tempfile::tempdir()?;
        let area = area_without_sweep(temp_dir.path()).await?;

        let result = area.remove("never-written.png").await;
        assert!(matches!(result, Err(StagingError::FileNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let base = temp_dir.path().join("uploads");
        let area = area_without_sweep(&base).await?;

        for name in ["../escape.png", "/etc/passwd", "bad\0.png", ""] {
            assert!(area.write(name, b"x").await.is_err(), "should reject {name:?}");
        }
        assert!(!temp_dir.path().join("escape.png").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_and_list() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let area = area_without_sweep(temp_dir.path()).await?;

        assert_eq!(area.stats().await.total_files, 0);

        area.write("b.png", b"12345").await?;
        area.write("a.jpg", b"123").await?;

        let stats = area.stats().await;
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_size_bytes, 8);
        assert_eq!(area.list().await?, vec!["a.jpg".to_string(), "b.png".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_files() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let temp_dir = tempfile::tempdir()?;
        let area = StagingArea::builder()
            .base_directory(temp_dir.path())
            .retention(RetentionPolicy::new().remove_after(Duration::from_millis(50)))
            .sweep_interval(Duration::ZERO)
            .build()
            .await?;

        let staged = area.write("orphan.png", b"left behind").await?;
        tokio::time::sleep(Duration::from_millis(120)).await;

        let removed = area.sweep_expired().await?;
        assert_eq!(removed, 1);
        assert!(!staged.path.exists());
        assert_eq!(area.stats().await.total_files, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let area = StagingArea::builder()
            .base_directory(temp_dir.path())
            .retention(RetentionPolicy::new().remove_after(Duration::from_secs(3600)))
            .sweep_interval(Duration::ZERO)
            .build()
            .await?;

        area.write("fresh.png", b"in flight").await?;
        assert_eq!(area.sweep_expired().await?, 0);
        assert!(area.exists("fresh.png").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_leftover_files_are_registered() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let temp_dir = tempfile::tempdir()?;
        std::fs::write(temp_dir.path().join("crashed.png"), b"from last run")?;

        let area = area_without_sweep(temp_dir.path()).await?;
        let stats = area.stats().await;
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_size_bytes, 13);
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweep() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let area = StagingArea::builder()
            .base_directory(temp_dir.path())
            .retention(RetentionPolicy::new().remove_after(Duration::from_secs(3600)))
            .sweep_interval(Duration::from_millis(20))
            .build()
            .await?;
        assert!(area.is_sweeping().await);

        let clone = area.clone();
        clone.shutdown().await;
        assert!(!area.is_sweeping().await);

        // Idempotent from any handle
        area.shutdown().await;
        assert!(!clone.is_sweeping().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_retention_has_no_sweep() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let temp_dir = tempfile::tempdir()?;
        let area = area_without_sweep(temp_dir.path()).await?;
        assert!(!area.is_sweeping().await);
        area.shutdown().await;
        Ok(())
    }
}
