//! Upload checks that run before anything touches the staging area

use serde_json::json;
use std::collections::BTreeSet;

use crate::errors::{AppError, AppResult, ErrorDetails};

/// Lower-cased text after the last dot, if there is a dot
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
}

/// Filename must be present and non-blank
pub fn require_filename(filename: Option<&str>) -> AppResult<&str> {
    match filename.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(AppError::invalid_image("No filename provided")),
    }
}

/// Extension of `filename` when it is in `allowed`
pub fn require_allowed_extension(filename: &str, allowed: &BTreeSet<String>) -> AppResult<String> {
    let extension = extension_of(filename).unwrap_or_default();
    if !extension.is_empty() && allowed.contains(&extension) {
        return Ok(extension);
    }

    let allowed_list: Vec<&str> = allowed.iter().map(String::as_str).collect();
    let mut details = ErrorDetails::new();
    details.insert("extension".to_string(), json!(extension));
    details.insert("allowed".to_string(), json!(allowed_list));

    Err(AppError::invalid_image_with(
        format!("Invalid file extension. Allowed: {}", allowed_list.join(", ")),
        details,
    ))
}

pub fn require_within_limit(size_bytes: u64, max_size_mb: u64) -> AppResult<()> {
    if size_bytes > max_size_mb * 1024 * 1024 {
        return Err(AppError::image_too_large(size_bytes, max_size_mb));
    }
    Ok(())
}

/// Integrity check: the bytes must carry a known image signature and
/// decode fully. Blocking; run it off the async workers.
pub fn verify_image(bytes: &[u8]) -> Result<(u32, u32), String> {
    match staging_area::sniff(bytes) {
        Some(kind) if kind.is_image() => {}
        Some(kind) => return Err(format!("content is {}, not an image", kind.mime_type)),
        None => return Err("unrecognised image format".to_string()),
    }

    let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    Ok((decoded.width(), decoded.height()))
}
