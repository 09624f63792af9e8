//! Magic number content sniffing.
//!
//! Types are decided by file signatures only; the declared name and
//! extension play no part.

use infer::Infer;
use std::sync::OnceLock;

/// A content type recognised from the leading bytes of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedType {
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Canonical extension for the type, e.g. `png`
    pub extension: String,
}

impl SniffedType {
    /// Whether this is any `image/*` type.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

fn matcher() -> &'static Infer {
    static INFER: OnceLock<Infer> = OnceLock::new();
    INFER.get_or_init(Infer::new)
}

/// Detect the content type of `bytes`, or `None` when no signature matches.
pub fn sniff(bytes: &[u8]) -> Option<SniffedType> {
    matcher().get(bytes).map(|kind| SniffedType {
        mime_type: kind.mime_type().to_string(),
        extension: kind.extension().to_string(),
    })
}
