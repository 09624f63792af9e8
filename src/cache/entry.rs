//! Cached feature summaries and their key scheme

use serde::{Deserialize, Serialize};

use crate::compute::FeatureSummary;

/// Namespace shared by every feature entry in the store
pub use crate::config::defaults::KEY_PREFIX;

/// Build the store key for a content hash: `features:<hash>`
pub fn cache_key(content_hash: &str) -> String {
    format!("{KEY_PREFIX}:{content_hash}")
}

/// What gets stored per image.
///
/// Wire form: `{"keypoints": 1234, "descriptors_shape": [1234, 128]}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub keypoints: u64,
    pub descriptors_shape: (u64, u64),
}

impl CacheEntry {
    pub fn new(keypoints: u64, descriptors_shape: (u64, u64)) -> Self {
        Self {
            keypoints,
            descriptors_shape,
        }
    }
}

impl From<FeatureSummary> for CacheEntry {
    fn from(summary: FeatureSummary) -> Self {
        Self::new(summary.keypoints, summary.descriptor_shape)
    }
}

impl From<CacheEntry> for FeatureSummary {
    fn from(entry: CacheEntry) -> Self {
        Self {
            keypoints: entry.keypoints,
            descriptor_shape: entry.descriptors_shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let entry = CacheEntry::new(1234, (1234, 128));
        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            json!({"keypoints": 1234, "descriptors_shape": [1234, 128]})
        );
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert!(serde_json::from_str::<CacheEntry>(r#"{"keypoints": -1, "descriptors_shape": [0, 0]}"#).is_err());
        assert!(serde_json::from_str::<CacheEntry>(r#"{"keypoints": 3}"#).is_err());
        assert!(serde_json::from_str::<CacheEntry>("not json").is_err());
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("abc123"), "features:abc123");
    }
}
