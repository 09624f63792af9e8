//! Content identity and image staging
//!
//! Uploads are validated, written to a sandboxed staging area under a
//! content-derived name, and addressed in the cache by the SHA-256 of their
//! bytes.

pub mod identity;
pub mod stager;
pub mod validation;

pub use identity::{cache_key_for_bytes, content_hash};
pub use stager::{ImageStager, StagedImage};
