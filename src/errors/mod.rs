//! Centralized error handling for the feature cache service
//!
//! Every failure that can reach a caller is an [`AppError`] variant with a
//! stable machine-readable code, a human-readable message and a structured
//! details map. Layer-specific errors ([`CacheError`], [`ComputeError`]) are
//! converted at the boundary where they stop being recoverable.
//!
//! # Error Categories
//!
//! - **Input**: `InvalidImage`, `ImageTooLarge`. Correctable by the caller, never retried
//! - **Availability**: `ServiceNotReady`, `CacheUnavailable`, `ComputeTimeout`. Safe to retry
//! - **Internal**: staging I/O, compute failures, configuration. Opaque server errors
//!
//! Cache read/write failures during request handling never become errors;
//! the cache layer absorbs them.
//!
//! # Usage
//!
//! ```rust
//! use feature_cache::errors::{AppError, AppResult};
//!
//! fn check(size_bytes: u64, limit_mb: u64) -> AppResult<()> {
//!     if size_bytes > limit_mb * 1024 * 1024 {
//!         return Err(AppError::image_too_large(size_bytes, limit_mb));
//!     }
//!     Ok(())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for raw cache store Results
pub type CacheResult<T> = Result<T, CacheError>;

/// Convenience type alias for compute engine Results
pub type ComputeResult<T> = Result<T, ComputeError>;
