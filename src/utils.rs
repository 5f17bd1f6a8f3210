//! Utility functions for patchlist
//!
//! Path conversion between the file system and the manifest's textual
//! relative paths, human-readable sizes, and atomic small-file writes.

use crate::error::{PatchlistError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Separator used for relative paths on this host
#[cfg(windows)]
pub const HOST_SEPARATOR: char = '\\';

/// Separator used for relative paths on this host
#[cfg(not(windows))]
pub const HOST_SEPARATOR: char = '/';

/// Separator that is rewritten to [`HOST_SEPARATOR`] when normalizing
#[cfg(windows)]
pub const FOREIGN_SEPARATOR: char = '/';

/// Separator that is rewritten to [`HOST_SEPARATOR`] when normalizing
#[cfg(not(windows))]
pub const FOREIGN_SEPARATOR: char = '\\';

/// Rewrite a relative path to the host separator and drop one leading separator
///
/// ```rust
/// use patchlist::utils::normalize_relative_path;
///
/// # #[cfg(not(windows))]
/// assert_eq!(normalize_relative_path("\\data\\maps\\a.pak"), "data/maps/a.pak");
/// ```
pub fn normalize_relative_path(raw: &str) -> String {
    let replaced = raw.replace(FOREIGN_SEPARATOR, &HOST_SEPARATOR.to_string());
    match replaced.strip_prefix(HOST_SEPARATOR) {
        Some(rest) => rest.to_string(),
        None => replaced,
    }
}

/// Strip `base` from `path`
///
/// Tries a lexical strip first so symlinked roots keep their spelling, then
/// falls back to comparing canonical paths.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| PatchlistError::internal(format!(
            "Path {:?} is not relative to {:?}",
            path_canon, base_canon
        )))
}

/// Characters a relative path cannot contain and still form one manifest line
pub const UNLISTABLE_CHARS: &[char] = &[':', '\n', '\r', '\0', FOREIGN_SEPARATOR];

/// Render a relative path as manifest text with host separators
///
/// Returns `None` when a component is not valid UTF-8 or contains one of
/// [`UNLISTABLE_CHARS`]; such a path would not survive parsing.
pub fn relative_path_string(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str()?;
        if part.contains(UNLISTABLE_CHARS) {
            return None;
        }
        parts.push(part);
    }
    Some(normalize_relative_path(&parts.join(&HOST_SEPARATOR.to_string())))
}

/// Same path with `/` separators, for glob matching
pub fn to_slash_path(relative: &str) -> String {
    relative.replace('\\', "/")
}

/// Format bytes in human-readable form (1024-based units)
///
/// ```rust
/// use patchlist::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Write a small file atomically
///
/// The content goes to a temporary file in the destination directory which
/// is then persisted over `path`, so readers see either the old or the new
/// content.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| PatchlistError::Io(e.error))?;
    Ok(())
}
