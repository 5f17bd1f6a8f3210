//! Manifest entries
//!
//! One entry describes one file of a content tree: its path relative to the
//! tree root, its content hash and its size in bytes. The textual form used
//! by manifest files is
//!
//! ```text
//! relative/path/to/file:0123456789ABCDEF0123456789ABCDEF:1024
//! ```
//!
//! ## Path separators
//!
//! Relative paths are stored with the separator of the host that parsed
//! them. A manifest produced on Windows (`data\maps\a.pak`) parsed on Linux
//! yields `data/maps/a.pak`, and the other way round. Serializing writes the
//! stored form back out, so a parse/serialize cycle on a different host does
//! not reproduce the original line byte for byte.
//!
//! ## Equality
//!
//! Two entries are equal when their paths are identical (case-sensitive),
//! their hashes are equal ignoring ASCII case, and their sizes are identical.

use crate::error::{PatchlistError, Result};
use crate::hasher::{hashes_match, HASH_LEN};
use crate::utils::normalize_relative_path;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

const FIELD_SEPARATOR: char = ':';

/// One file of a manifest
///
/// # Examples
///
/// ```rust
/// use patchlist::ManifestEntry;
///
/// let entry: ManifestEntry = "bin/game.exe:5d41402abc4b2a76b9719d911017c592:5".parse()?;
/// assert_eq!(entry.size(), 5);
///
/// let upper = ManifestEntry::parse("bin/game.exe:5D41402ABC4B2A76B9719D911017C592:5")?;
/// assert_eq!(entry, upper);
/// # Ok::<(), patchlist::PatchlistError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    relative_path: String,
    hash: String,
    size: u64,
}

impl ManifestEntry {
    /// Build an entry from its parts
    ///
    /// The path is normalized to host separators. Fails if the hash is not
    /// exactly 32 characters long.
    pub fn new(relative_path: impl AsRef<str>, hash: impl Into<String>, size: u64) -> Result<Self> {
        let hash = hash.into();
        if hash.chars().count() != HASH_LEN {
            return Err(PatchlistError::malformed(format!(
                "hash must be {} characters, found {}",
                HASH_LEN,
                hash.chars().count()
            )));
        }
        Ok(Self {
            relative_path: normalize_relative_path(relative_path.as_ref()),
            hash,
            size,
        })
    }

    /// Parse one manifest line
    ///
    /// Line breaks and NUL characters anywhere in the input are removed
    /// before splitting, so lines with foreign line endings still parse.
    /// Only the hash length is checked, not its characters.
    ///
    /// # Errors
    ///
    /// [`PatchlistError::MalformedEntry`] when the input does not have exactly
    /// three `:`-separated fields, the hash is not 32 characters long, or the
    /// size is not a non-negative 64-bit integer.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, '\n' | '\r' | '\0'))
            .collect();

        if cleaned.is_empty() {
            return Err(PatchlistError::malformed("empty line"));
        }

        let fields: Vec<&str> = cleaned.split(FIELD_SEPARATOR).collect();
        let [path, hash, size] = fields.as_slice() else {
            return Err(PatchlistError::malformed(format!(
                "expected 3 fields, found {}",
                fields.len()
            )));
        };

        let size: i64 = size
            .parse()
            .map_err(|_| PatchlistError::malformed(format!("size is not an integer: {:?}", size)))?;
        if size < 0 {
            return Err(PatchlistError::malformed(format!("negative size: {}", size)));
        }

        Self::new(path, *hash, size as u64)
    }

    /// Parse an optional line; `None` is treated like an empty line
    pub fn parse_opt(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Err(PatchlistError::malformed("no input")),
        }
    }

    /// Path relative to the tree root, with host separators
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Content hash as it was written (case preserved)
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Where this entry lives under `root`
    ///
    /// Only plain path components are joined, so the result always lies
    /// inside `root`.
    ///
    /// # Errors
    ///
    /// [`PatchlistError::MalformedEntry`] when the relative path is empty or
    /// contains a root, drive prefix or `..` component.
    pub fn local_path(&self, root: &Path) -> Result<PathBuf> {
        let mut path = root.to_path_buf();
        let mut pushed = false;
        for component in Path::new(&self.relative_path).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    pushed = true;
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) | Component::ParentDir => {
                    return Err(PatchlistError::malformed(format!(
                        "path escapes the install root: {}",
                        self.relative_path
                    )));
                }
            }
        }
        if !pushed {
            return Err(PatchlistError::malformed(format!(
                "path names no file: {:?}",
                self.relative_path
            )));
        }
        Ok(path)
    }

    /// Whether `hash` matches this entry's hash, ignoring case
    pub fn hash_matches(&self, hash: &str) -> bool {
        hashes_match(&self.hash, hash)
    }

    /// Canonical `relativePath:hash:size` form
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.relative_path, FIELD_SEPARATOR, self.hash, FIELD_SEPARATOR, self.size
        )
    }
}

impl FromStr for ManifestEntry {
    type Err = PatchlistError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for ManifestEntry {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
            && self.size == other.size
            && hashes_match(&self.hash, &other.hash)
    }
}

impl Eq for ManifestEntry {}

impl Hash for ManifestEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relative_path.hash(state);
        for byte in self.hash.bytes() {
            byte.to_ascii_uppercase().hash(state);
        }
        self.size.hash(state);
    }
}
