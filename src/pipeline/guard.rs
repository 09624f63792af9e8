//! Exactly-once release of a staged image

use crate::staging::{ImageStager, StagedImage};

/// Owns a staged image for the duration of a request.
///
/// Normal paths call [`StagingGuard::release`] and await it. If the guard
/// is dropped first (early return, panic, cancelled future) the file is
/// released in the background instead. Either way it happens once.
pub struct StagingGuard {
    stager: ImageStager,
    staged: Option<StagedImage>,
}

impl StagingGuard {
    pub fn new(stager: ImageStager, staged: StagedImage) -> Self {
        Self {
            stager,
            staged: Some(staged),
        }
    }

    pub async fn release(mut self) {
        if let Some(staged) = self.staged.take() {
            self.stager.release(&staged).await;
        }
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if let Some(staged) = self.staged.take() {
            self.stager.release_detached(&staged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageConfig;
    use bytes::Bytes;
    use staging_area::{RetentionPolicy, StagingArea};
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn staged_image() -> (ImageStager, StagedImage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let area = StagingArea::builder()
            .base_directory(temp_dir.path())
            .retention(RetentionPolicy::disabled())
            .build()
            .await
            .unwrap();
        let stager = ImageStager::new(area, &ImageConfig::default());

        let mut png = Cursor::new(Vec::new());
        image::GrayImage::from_pixel(8, 8, image::Luma([200]))
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        let staged = stager
            .validate_and_stage(Bytes::from(png.into_inner()), Some("g.png"))
            .await
            .unwrap();
        (stager, staged, temp_dir)
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let (stager, staged, _dir) = staged_image().await;
        let path = staged.path.clone();

        let guard = StagingGuard::new(stager.clone(), staged);
        guard.release().await;

        assert!(!path.exists());
        assert!(stager.area().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let (stager, staged, _dir) = staged_image().await;
        let path = staged.path.clone();

        drop(StagingGuard::new(stager, staged));
        for _ in 0..50 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
    }
}
