//! Content-addressed caching service for image feature detection.
//!
//! Uploads are staged, identified by the SHA-256 of their bytes, and looked
//! up in a TTL-bounded cache. Misses are computed on a bounded pool of
//! blocking workers and written back. See [`pipeline::FeaturePipeline`] for
//! the request flow.

pub mod cache;
pub mod compute;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod staging;
pub mod web;
