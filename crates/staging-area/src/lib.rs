//! # Staging Area
//!
//! A sandboxed directory for short-lived uploads.
//!
//! Callers hand bytes in under a flat name, get back the on-disk location, and
//! remove the file once they are done with it. Everything is confined to a
//! single base directory: names that are empty, contain NUL bytes, are
//! absolute, or resolve outside the base are rejected before any I/O happens.
//!
//! Files that are never removed (a crash between write and remove, a failed
//! delete) are picked up by a background sweep once they outlive the
//! configured retention window. Files already present at startup are
//! registered so the sweep sees them too.
//!
//! ## Features
//!
//! - **Sandboxed Operations**: all paths resolve inside the base directory
//! - **Secure Permissions**: the base directory is created with mode 0700 (Unix)
//! - **Orphan Sweeping**: two-phase cleanup of files older than the retention window
//! - **Magic Number Sniffing**: content type detection via the `infer` crate
//!
//! ## Basic Usage
//!
//! ```rust
//! use staging_area::{RetentionPolicy, StagingArea};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let area = StagingArea::builder()
//!     .base_directory("/var/lib/myapp/uploads")
//!     .retention(RetentionPolicy::new().remove_after(Duration::from_secs(15 * 60)))
//!     .sweep_interval(Duration::from_secs(60))
//!     .build()
//!     .await?;
//!
//! let staged = area.write("3f2a9c.png", b"...").await?;
//! println!("staged at {}", staged.path.display());
//!
//! area.remove("3f2a9c.png").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Blocked names
//!
//! ```rust,ignore
//! area.write("../../etc/passwd", b"x").await?; // escapes the area
//! area.write("/etc/passwd", b"x").await?;      // absolute
//! area.write("file\0.png", b"x").await?;       // NUL byte
//! ```

pub mod area;
pub mod error;
pub mod policy;
pub mod security;
pub mod sniff;

pub use area::{AreaStats, StagedFile, StagingArea, StagingAreaBuilder};
pub use error::{Result, StagingError};
pub use policy::RetentionPolicy;
pub use sniff::{SniffedType, sniff};

pub use std::time::Duration;
