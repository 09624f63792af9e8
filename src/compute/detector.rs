//! Built-in corner detector
//!
//! Harris corners over a grayscale copy of the image, thinned with 3x3
//! non-maximum suppression. Deterministic: the same pixels always produce
//! the same keypoint count.

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Luma};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::{ComputeEngine, FeatureSummary};
use crate::config::ComputeConfig;
use crate::config::defaults::DEFAULT_DESCRIPTOR_SIZE;
use crate::errors::{ComputeError, ComputeResult};

type GrayImage32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Harris sensitivity constant
const HARRIS_K: f32 = 0.04;

/// Window radius for the structure tensor sum
const WINDOW_RADIUS: usize = 1;

/// Sobel needs one pixel of border, the tensor window another
const BORDER: usize = 1 + WINDOW_RADIUS;

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub max_features: usize,
    /// Longest side fed to the detector
    pub max_dimension: u32,
    /// Columns of the descriptor matrix
    pub descriptor_size: u64,
    /// Fraction of the strongest response a corner must reach
    pub quality_level: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from(&ComputeConfig::default())
    }
}

impl From<&ComputeConfig> for DetectorSettings {
    fn from(config: &ComputeConfig) -> Self {
        Self {
            max_features: config.max_features,
            max_dimension: config.max_dimension,
            descriptor_size: DEFAULT_DESCRIPTOR_SIZE,
            quality_level: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Keypoint {
    x: usize,
    y: usize,
    response: f32,
}

#[derive(Debug)]
pub struct GradientDetector {
    settings: DetectorSettings,
    ready: AtomicBool,
}

impl GradientDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            ready: AtomicBool::new(false),
        }
    }

    /// Detect on an already decoded image
    pub fn detect(&self, image: &DynamicImage) -> FeatureSummary {
        let prepared = self.prepare(image);
        let keypoints = detect_corners(&prepared, &self.settings).len() as u64;

        FeatureSummary {
            keypoints,
            descriptor_shape: (keypoints, self.settings.descriptor_size),
        }
    }

    fn prepare(&self, image: &DynamicImage) -> GrayImage32 {
        let max_dimension = self.settings.max_dimension;
        if image.width().max(image.height()) > max_dimension {
            // resize keeps the aspect ratio inside the bounding box
            image
                .resize(max_dimension, max_dimension, FilterType::Triangle)
                .to_luma32f()
        } else {
            image.to_luma32f()
        }
    }
}

impl ComputeEngine for GradientDetector {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn warmup(&self) -> ComputeResult<()> {
        let summary = self.detect(&warmup_image());
        if summary.keypoints == 0 {
            return Err(ComputeError::Warmup {
                message: "no corners found in calibration image".to_string(),
            });
        }

        self.ready.store(true, Ordering::Release);
        info!(
            "Gradient detector ready ({} calibration corners)",
            summary.keypoints
        );
        Ok(())
    }

    fn process(&self, path: &Path) -> ComputeResult<FeatureSummary> {
        if !self.is_ready() {
            return Err(ComputeError::Detection {
                message: "detector has not been warmed up".to_string(),
            });
        }

        let image = image::open(path).map_err(|e| ComputeError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let summary = self.detect(&image);
        debug!(
            "Detected {} keypoints in {} ({}x{})",
            summary.keypoints,
            path.display(),
            image.width(),
            image.height()
        );
        Ok(summary)
    }
}

/// 64x64 checkerboard with 8px squares
fn warmup_image() -> DynamicImage {
    let board = ImageBuffer::from_fn(64, 64, |x, y| {
        if ((x / 8) + (y / 8)) % 2 == 0 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    DynamicImage::ImageLuma8(board)
}

fn harris_response(gray: &GrayImage32) -> Vec<f32> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let pixels = gray.as_raw();
    let at = |x: usize, y: usize| pixels[y * width + x];

    let mut ixx = vec![0f32; width * height];
    let mut iyy = vec![0f32; width * height];
    let mut ixy = vec![0f32; width * height];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            let i = y * width + x;
            ixx[i] = gx * gx;
            iyy[i] = gy * gy;
            ixy[i] = gx * gy;
        }
    }

    let mut response = vec![0f32; width * height];
    for y in BORDER..height - BORDER {
        for x in BORDER..width - BORDER {
            let (mut sxx, mut syy, mut sxy) = (0f32, 0f32, 0f32);
            for wy in y - WINDOW_RADIUS..=y + WINDOW_RADIUS {
                for wx in x - WINDOW_RADIUS..=x + WINDOW_RADIUS {
                    let i = wy * width + wx;
                    sxx += ixx[i];
                    syy += iyy[i];
                    sxy += ixy[i];
                }
            }
            let det = sxx * syy - sxy * sxy;
            let trace = sxx + syy;
            response[y * width + x] = det - HARRIS_K * trace * trace;
        }
    }
    response
}

fn detect_corners(gray: &GrayImage32, settings: &DetectorSettings) -> Vec<Keypoint> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    if width <= 2 * BORDER || height <= 2 * BORDER {
        return Vec::new();
    }

    let response = harris_response(gray);
    let strongest = response.iter().copied().fold(0f32, f32::max);
    if strongest <= 0.0 {
        return Vec::new();
    }
    let threshold = strongest * settings.quality_level;

    let mut corners = Vec::new();
    for y in BORDER..height - BORDER {
        for x in BORDER..width - BORDER {
            let index = y * width + x;
            let value = response[index];
            if value <= threshold {
                continue;
            }

            // Plateaus keep only their first pixel in scan order
            let is_peak = NEIGHBOURS.iter().all(|&(dx, dy)| {
                let nx = x.wrapping_add_signed(dx);
                let ny = y.wrapping_add_signed(dy);
                let neighbour_index = ny * width + nx;
                let neighbour = response[neighbour_index];
                neighbour < value || (neighbour == value && neighbour_index > index)
            });

            if is_peak {
                corners.push(Keypoint {
                    x,
                    y,
                    response: value,
                });
            }
        }
    }

    corners.sort_by(|a, b| {
        b.response
            .total_cmp(&a.response)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    corners.truncate(settings.max_features);
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ready_detector(settings: DetectorSettings) -> GradientDetector {
        let detector = GradientDetector::new(settings);
        detector.warmup().unwrap();
        detector
    }

    #[test]
    fn test_not_ready_until_warmed_up() {
        let detector = GradientDetector::new(DetectorSettings::default());
        assert!(!detector.is_ready());
        assert!(detector.process(Path::new("whatever.png")).is_err());

        detector.warmup().unwrap();
        assert!(detector.is_ready());
    }

    #[test]
    fn test_checkerboard_has_corners() {
        let detector = ready_detector(DetectorSettings::default());
        let summary = detector.detect(&warmup_image());

        assert!(summary.keypoints > 0);
        assert_eq!(summary.descriptor_shape, (summary.keypoints, 128));
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let detector = ready_detector(DetectorSettings::default());
        let flat = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(40, 40, Luma([128u8])));

        let summary = detector.detect(&flat);
        assert_eq!(summary.keypoints, 0);
        assert_eq!(summary.descriptor_shape, (0, 128));
    }

    #[test]
    fn test_tiny_image_is_handled() {
        let detector = ready_detector(DetectorSettings::default());
        let tiny = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(1, 1, Luma([0u8])));
        assert_eq!(detector.detect(&tiny).keypoints, 0);
    }

    #[test]
    fn test_max_features_caps_output() {
        let detector = ready_detector(DetectorSettings {
            max_features: 3,
            ..DetectorSettings::default()
        });
        assert_eq!(detector.detect(&warmup_image()).keypoints, 3);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = ready_detector(DetectorSettings::default());
        let image = warmup_image();
        assert_eq!(detector.detect(&image), detector.detect(&image));
    }

    #[test]
    fn test_large_images_are_downscaled() {
        let detector = ready_detector(DetectorSettings {
            max_dimension: 32,
            ..DetectorSettings::default()
        });
        let prepared = detector.prepare(&DynamicImage::new_luma8(128, 64));
        assert_eq!((prepared.width(), prepared.height()), (32, 16));
    }

    #[test]
    fn test_process_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("board.png");
        warmup_image().save(&path).unwrap();

        let detector = ready_detector(DetectorSettings::default());
        let from_file = detector.process(&path).unwrap();
        assert_eq!(from_file, detector.detect(&warmup_image()));

        let missing = detector.process(&temp_dir.path().join("missing.png"));
        assert!(matches!(missing, Err(ComputeError::Load { .. })));
    }
}
