//! Error type definitions for the feature cache service

use serde_json::{Map, Value, json};
use std::time::Duration;
use thiserror::Error;

/// Structured, machine-readable context attached to an error response
pub type ErrorDetails = Map<String, Value>;

/// Top-level application error type
///
/// A closed set: every failure the pipeline can surface is one of these.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing filename, disallowed extension, or undecodable content
    #[error("{message}")]
    InvalidImage {
        message: String,
        details: ErrorDetails,
    },

    /// Upload exceeds the configured size limit. `size_mb` is unknown when
    /// the body was cut off before its length could be established.
    #[error("{}", too_large_message(.size_mb, .max_size_mb))]
    ImageTooLarge {
        size_mb: Option<f64>,
        max_size_mb: u64,
    },

    /// The staged copy could not be written
    #[error("Failed to stage image: {message}")]
    ImageStagingFailed { message: String },

    /// Compute engine has not finished warming up
    #[error("Service is warming up, please try again")]
    ServiceNotReady,

    /// Cache store unreachable where it is required (startup)
    #[error("Failed to connect to cache: {message}")]
    CacheUnavailable { message: String },

    /// Compute engine raised while processing a valid staged image
    #[error("Feature computation failed: {message}")]
    ComputeFailed { message: String },

    /// Computation exceeded its deadline
    #[error("Feature computation timed out after {timeout:?}")]
    ComputeTimeout { timeout: Duration },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse grouping used for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Availability,
    Internal,
}

/// Raw cache store failures. Never leave the cache layer during request
/// handling; only `connect` turns one into an [`AppError`].
#[derive(Error, Debug)]
pub enum CacheError {
    /// Could not reach the store in time
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// The store answered with an error
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The store did not answer within the operation deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Operation attempted after disconnect
    #[error("Cache is not connected")]
    NotConnected,

    /// Payload could not be (de)serialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Compute engine failures
#[derive(Error, Debug)]
pub enum ComputeError {
    /// The staged file could not be opened or decoded
    #[error("Failed to load image {path}: {message}")]
    Load { path: String, message: String },

    /// The detector itself failed
    #[error("Detection failed: {message}")]
    Detection { message: String },

    /// Warmup did not complete
    #[error("Warmup failed: {message}")]
    Warmup { message: String },

    /// The worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// The worker pool was shut down
    #[error("Worker pool is closed")]
    PoolClosed,
}

impl AppError {
    /// Invalid image with no extra context
    pub fn invalid_image<S: Into<String>>(message: S) -> Self {
        Self::InvalidImage {
            message: message.into(),
            details: ErrorDetails::new(),
        }
    }

    /// Invalid image carrying details for the caller
    pub fn invalid_image_with<S: Into<String>>(message: S, details: ErrorDetails) -> Self {
        Self::InvalidImage {
            message: message.into(),
            details,
        }
    }

    /// Size limit exceeded; `size_mb` is rounded to two decimals
    pub fn image_too_large(size_bytes: u64, max_size_mb: u64) -> Self {
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        Self::ImageTooLarge {
            size_mb: Some((size_mb * 100.0).round() / 100.0),
            max_size_mb,
        }
    }

    /// Size limit exceeded by a body of unknown total length
    pub fn image_too_large_unsized(max_size_mb: u64) -> Self {
        Self::ImageTooLarge {
            size_mb: None,
            max_size_mb,
        }
    }

    pub fn staging_failed<S: Into<String>>(message: S) -> Self {
        Self::ImageStagingFailed {
            message: message.into(),
        }
    }

    pub fn cache_unavailable<S: Into<String>>(message: S) -> Self {
        Self::CacheUnavailable {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidImage { .. } => "INVALID_IMAGE",
            Self::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            Self::ImageStagingFailed { .. } => "IMAGE_STAGING_FAILED",
            Self::ServiceNotReady => "SERVICE_NOT_READY",
            Self::CacheUnavailable { .. } => "CACHE_CONNECTION_ERROR",
            Self::ComputeFailed { .. } => "COMPUTE_FAILED",
            Self::ComputeTimeout { .. } => "SERVICE_TIMEOUT",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidImage { .. } | Self::ImageTooLarge { .. } => ErrorCategory::Input,
            Self::ServiceNotReady | Self::CacheUnavailable { .. } | Self::ComputeTimeout { .. } => {
                ErrorCategory::Availability
            }
            Self::ImageStagingFailed { .. }
            | Self::ComputeFailed { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether a caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Availability
    }

    /// Message safe to show a caller. Internal errors stay opaque.
    pub fn public_message(&self) -> String {
        match self.category() {
            ErrorCategory::Internal => match self {
                Self::ImageStagingFailed { .. } => "Failed to stage image".to_string(),
                Self::ComputeFailed { .. } => "Feature computation failed".to_string(),
                _ => "An unexpected error occurred".to_string(),
            },
            _ => self.to_string(),
        }
    }

    /// Structured details for programmatic handling
    pub fn details(&self) -> ErrorDetails {
        match self {
            Self::InvalidImage { details, .. } => details.clone(),
            Self::ImageTooLarge {
                size_mb,
                max_size_mb,
            } => {
                let mut details = ErrorDetails::new();
                details.insert("size_mb".to_string(), json!(size_mb));
                details.insert("max_size_mb".to_string(), json!(max_size_mb));
                details
            }
            Self::ComputeTimeout { timeout } => {
                let mut details = ErrorDetails::new();
                details.insert("operation".to_string(), json!("feature_detection"));
                details.insert("timeout_seconds".to_string(), json!(timeout.as_secs_f64()));
                details
            }
            _ => ErrorDetails::new(),
        }
    }
}

fn too_large_message(size_mb: &Option<f64>, max_size_mb: &u64) -> String {
    match size_mb {
        Some(size_mb) => format!("Image size {size_mb:.2}MB exceeds limit of {max_size_mb}MB"),
        None => format!("Image exceeds limit of {max_size_mb}MB"),
    }
}

impl From<ComputeError> for AppError {
    fn from(err: ComputeError) -> Self {
        Self::ComputeFailed {
            message: err.to_string(),
        }
    }
}

impl From<staging_area::StagingError> for AppError {
    fn from(err: staging_area::StagingError) -> Self {
        Self::ImageStagingFailed {
            message: err.to_string(),
        }
    }
}
