//! Image staging on top of the sandboxed staging area

use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::identity::{content_hash, short_hash};
use super::validation::{
    require_allowed_extension, require_filename, require_within_limit, verify_image,
};
use crate::cache::cache_key;
use crate::config::ImageConfig;
use crate::errors::{AppError, AppResult, ErrorDetails};
use staging_area::StagingArea;

/// A request-owned copy of an uploaded image
#[derive(Debug, Clone, Serialize)]
pub struct StagedImage {
    /// File name inside the staging area
    pub name: String,
    pub path: PathBuf,
    /// Full SHA-256 hex of the uploaded bytes
    pub content_hash: String,
    pub size_bytes: u64,
    /// Lower-cased declared extension
    pub extension: String,
}

/// Validates uploads and owns their staged copies
#[derive(Clone, Debug)]
pub struct ImageStager {
    area: StagingArea,
    allowed_extensions: BTreeSet<String>,
    max_size_mb: u64,
}

impl ImageStager {
    pub fn new(area: StagingArea, config: &ImageConfig) -> Self {
        let allowed_extensions = config
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            area,
            allowed_extensions,
            max_size_mb: config.max_size_mb,
        }
    }

    pub fn area(&self) -> &StagingArea {
        &self.area
    }

    /// Validate `bytes` and write them to the staging area.
    ///
    /// Checks run cheapest first: filename, extension, size, then a full
    /// decode on the blocking pool. Nothing is written unless all pass.
    pub async fn validate_and_stage(
        &self,
        bytes: Bytes,
        filename: Option<&str>,
    ) -> AppResult<StagedImage> {
        let filename = require_filename(filename)?;
        let extension = require_allowed_extension(filename, &self.allowed_extensions)?;
        let size_bytes = bytes.len() as u64;
        require_within_limit(size_bytes, self.max_size_mb)?;

        let payload = bytes.clone();
        let (verified, content_hash) = tokio::task::spawn_blocking(move || {
            (verify_image(&payload), content_hash(&payload))
        })
        .await
        .map_err(|e| AppError::internal(format!("image verification task failed: {e}")))?;

        let (width, height) = verified.map_err(|reason| {
            let mut details = ErrorDetails::new();
            details.insert("reason".to_string(), serde_json::Value::String(reason));
            AppError::invalid_image_with("Invalid or corrupted image file", details)
        })?;

        // Per-request suffix: identical concurrent uploads never share a file
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}-{}.{}",
            short_hash(&content_hash),
            &nonce[..8],
            extension
        );

        let staged = self.area.write(&name, &bytes).await?;
        info!(
            "Staged image {} ({} bytes, {}x{}) as {}",
            filename, size_bytes, width, height, staged.name
        );

        Ok(StagedImage {
            name: staged.name,
            path: staged.path,
            content_hash,
            size_bytes,
            extension,
        })
    }

    /// Content-addressed cache key for a staged image, recomputed from the
    /// file on disk. Falls back to a key over the path string when the file
    /// cannot be read; that key never matches a content-derived one.
    pub async fn cache_key_for(&self, staged: &StagedImage) -> String {
        match self.area.read(&staged.name).await {
            Ok(bytes) => {
                match tokio::task::spawn_blocking(move || content_hash(&bytes)).await {
                    Ok(hash) => return cache_key(&hash),
                    Err(e) => warn!("Hashing staged image {} failed: {}", staged.name, e),
                }
            }
            Err(e) => warn!(
                "Could not re-read staged image {}, using path-derived key: {}",
                staged.name, e
            ),
        }

        cache_key(&content_hash(staged.path.to_string_lossy().as_bytes()))
    }

    /// Remove the staged copy. Failures are logged, never raised.
    pub async fn release(&self, staged: &StagedImage) {
        match self.area.remove(&staged.name).await {
            Ok(()) => debug!("Released staged image {}", staged.name),
            Err(e) => warn!("Failed to release staged image {}: {}", staged.name, e),
        }
    }

    /// Release from a context that cannot await, such as a destructor
    pub fn release_detached(&self, staged: &StagedImage) {
        let name = staged.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let area = self.area.clone();
                handle.spawn(async move {
                    if let Err(e) = area.remove(&name).await {
                        warn!("Failed to release staged image {}: {}", name, e);
                    }
                });
            }
            // No runtime left; the retention sweep picks it up on next start
            Err(_) => warn!("No runtime to release staged image {}", name),
        }
    }
}
