//! Path validation and directory hardening.

use crate::error::{Result, StagingError};
use std::path::{Path, PathBuf};

/// Restrict the base directory to its owner (Unix only).
pub async fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| StagingError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(StagingError::invalid(path, "Directory does not exist"));
        }
    }

    Ok(())
}

/// Cheap checks that need no filesystem access.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StagingError::invalid(name, "Name cannot be empty"));
    }

    if name.contains('\0') {
        return Err(StagingError::invalid(name, "Name contains null bytes"));
    }

    if Path::new(name).is_absolute() {
        return Err(StagingError::invalid(
            name,
            "Absolute paths not allowed - use names relative to the staging area",
        ));
    }

    Ok(())
}

/// Resolve `name` against `base` and make sure the result stays inside it.
///
/// Missing parent directories are created so that the parent can be
/// canonicalized; symlinks and `..` segments are resolved by the OS before
/// the containment check.
pub fn resolve_within(base: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;

    let full_path = base.join(name);

    let canonical_base = base
        .canonicalize()
        .map_err(|e| StagingError::invalid(base, format!("Failed to canonicalize base: {e}")))?;

    if let Some(parent) = full_path.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| StagingError::DirectoryCreation {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let resolved = if full_path.exists() {
        full_path.canonicalize().map_err(|e| {
            StagingError::invalid(&full_path, format!("Failed to resolve existing path: {e}"))
        })?
    } else {
        let parent = full_path
            .parent()
            .ok_or_else(|| StagingError::invalid(&full_path, "Path has no parent directory"))?;
        let canonical_parent = parent.canonicalize().map_err(|e| {
            StagingError::invalid(parent, format!("Failed to resolve parent directory: {e}"))
        })?;
        let file_name = full_path
            .file_name()
            .ok_or_else(|| StagingError::invalid(&full_path, "Invalid file name"))?;
        canonical_parent.join(file_name)
    };

    if !resolved.starts_with(&canonical_base) {
        return Err(StagingError::invalid(
            &full_path,
            format!(
                "Path escapes staging area: '{}' resolves to '{}' (outside '{}')",
                name,
                resolved.display(),
                canonical_base.display()
            ),
        ));
    }

    tracing::trace!("Resolved staged name '{}' -> '{}'", name, resolved.display());

    Ok(full_path)
}
