//! Integrity checking of installed files
//!
//! Verification answers one question per entry: does the file under the
//! install root still match what the manifest says? The checks run cheapest
//! first:
//!
//! 1. **Existence**: the file must exist and be a regular file
//! 2. **Size**: the byte length must equal the entry's size
//! 3. **Content**: the MD5 hash must equal the entry's hash (ignoring case)
//!
//! A mismatch is a verdict, not an error. What to do about it (download,
//! delete, repair) is left to the caller.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use patchlist::verification::IntegrityChecker;
//! use patchlist::manifest::load_manifest;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = load_manifest(Path::new("/opt/game/GameManifest.txt"))?;
//! let checker = IntegrityChecker::new("/opt/game");
//!
//! let report = checker.verify_manifest(&manifest)?;
//! println!("{}", report.summary());
//! for check in report.failures() {
//!     println!("needs repair: {}", check.relative_path);
//! }
//! # Ok(())
//! # }
//! ```

use crate::entry::ManifestEntry;
use crate::error::{PatchlistError, Result};
use crate::hasher::{self, hashes_match, HASH_LEN};
use crate::manifest::Manifest;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Verdict for one manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileStatus {
    /// Size and hash both match
    Intact,
    /// Nothing exists at the entry's path
    Missing,
    /// Something exists at the path but it is not a regular file
    NotAFile,
    /// File exists with a different length
    SizeMismatch {
        /// Size recorded in the manifest
        expected: u64,
        /// Size found on disk
        actual: u64,
    },
    /// File has the right length but different content
    HashMismatch {
        /// Hash recorded in the manifest
        expected: String,
        /// Hash computed from disk
        actual: String,
    },
    /// The file could not be read, or its path is not usable under the
    /// install root (only produced in reports)
    Unreadable,
}

impl FileStatus {
    /// Whether the file matches its entry
    pub fn is_intact(&self) -> bool {
        matches!(self, FileStatus::Intact)
    }
}

/// Verifies installed files against manifest entries
///
/// Holds no mutable state, so one checker can be shared across threads and
/// entries can be checked in parallel.
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    install_root: PathBuf,
}

impl IntegrityChecker {
    /// Create a checker for files installed under `install_root`
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
        }
    }

    /// Root that entry paths are resolved against
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Whether the file for `entry` exists, has the right size and hash
    ///
    /// Any I/O problem counts as "not intact". Use [`check`](Self::check) to
    /// tell an unreadable file apart from a corrupt one.
    pub fn is_intact(&self, entry: &ManifestEntry) -> bool {
        match self.check(entry) {
            Ok(status) => status.is_intact(),
            Err(e) => {
                debug!("Could not check {}: {}", entry.relative_path(), e);
                false
            }
        }
    }

    /// Check one entry and report why it does or does not match
    ///
    /// # Errors
    ///
    /// - [`PatchlistError::MalformedEntry`] if the entry's path would resolve
    ///   outside the install root
    /// - [`PatchlistError::Io`] for I/O failures other than the file being
    ///   absent, such as permission or device errors
    pub fn check(&self, entry: &ManifestEntry) -> Result<FileStatus> {
        let path = entry.local_path(&self.install_root)?;

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("Missing: {:?}", path);
                return Ok(FileStatus::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Ok(FileStatus::NotAFile);
        }

        if metadata.len() != entry.size() {
            trace!("Size mismatch for {:?}: {} != {}", path, metadata.len(), entry.size());
            return Ok(FileStatus::SizeMismatch {
                expected: entry.size(),
                actual: metadata.len(),
            });
        }

        let actual = match hasher::hash_file(&path) {
            Ok(hash) => hash,
            // Removed between the stat and the open
            Err(PatchlistError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return Ok(FileStatus::Missing);
            }
            Err(e) => return Err(e),
        };

        if entry.hash_matches(&actual) {
            Ok(FileStatus::Intact)
        } else {
            Ok(FileStatus::HashMismatch {
                expected: entry.hash().to_string(),
                actual,
            })
        }
    }

    /// Check every entry of a manifest
    ///
    /// Entries are hashed in parallel on the rayon pool; the report keeps
    /// manifest order. Unreadable files are recorded as
    /// [`FileStatus::Unreadable`] with the error message instead of
    /// aborting the whole run.
    pub fn verify_manifest(&self, manifest: &Manifest) -> Result<VerificationReport> {
        let start = Instant::now();
        debug!(
            "Verifying {} entries under {:?}",
            manifest.len(),
            self.install_root
        );

        let file_checks: Vec<FileCheck> = manifest
            .entries()
            .par_iter()
            .map(|entry| match self.check(entry) {
                Ok(status) => FileCheck {
                    relative_path: entry.relative_path().to_string(),
                    status,
                    error: None,
                },
                Err(e) => {
                    warn!("Could not verify {}: {}", entry.relative_path(), e);
                    FileCheck {
                        relative_path: entry.relative_path().to_string(),
                        status: FileStatus::Unreadable,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        let files_intact = file_checks.iter().filter(|c| c.status.is_intact()).count();
        let report = VerificationReport {
            install_root: self.install_root.clone(),
            total_files_checked: file_checks.len(),
            files_intact,
            file_checks,
            verification_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Verified {} in {}ms: {} / {} files intact",
            self.install_root.display(),
            report.verification_time_ms,
            report.files_intact,
            report.total_files_checked
        );

        Ok(report)
    }
}

/// Whether the file for `entry` under `install_root` is intact
pub fn is_intact(entry: &ManifestEntry, install_root: &Path) -> bool {
    IntegrityChecker::new(install_root).is_intact(entry)
}

/// Result of checking one entry
#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    /// Relative path of the entry
    pub relative_path: String,
    /// Verdict
    pub status: FileStatus,
    /// Error message when the file could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileCheck {
    /// Whether the entry checked out
    pub fn is_valid(&self) -> bool {
        self.status.is_intact()
    }
}

/// Verification report for a whole manifest
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Root the manifest was checked against
    pub install_root: PathBuf,
    /// Per-entry results in manifest order
    pub file_checks: Vec<FileCheck>,
    /// Total entries checked
    pub total_files_checked: usize,
    /// Entries that matched
    pub files_intact: usize,
    /// Time taken in milliseconds
    pub verification_time_ms: u64,
}

impl VerificationReport {
    /// Whether every entry matched
    pub fn is_valid(&self) -> bool {
        self.files_intact == self.total_files_checked
    }

    /// Entries that did not match
    pub fn failures(&self) -> impl Iterator<Item = &FileCheck> {
        self.file_checks.iter().filter(|c| !c.is_valid())
    }

    /// Count entries with a given kind of verdict
    pub fn count_where(&self, predicate: impl Fn(&FileStatus) -> bool) -> usize {
        self.file_checks.iter().filter(|c| predicate(&c.status)).count()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!(
                "All {} files intact ({}ms)",
                self.total_files_checked, self.verification_time_ms
            );
        }

        let missing = self.count_where(|s| matches!(s, FileStatus::Missing | FileStatus::NotAFile));
        let size = self.count_where(|s| matches!(s, FileStatus::SizeMismatch { .. }));
        let hash = self.count_where(|s| matches!(s, FileStatus::HashMismatch { .. }));
        let unreadable = self.count_where(|s| matches!(s, FileStatus::Unreadable));

        let issues = [
            (missing > 0).then(|| format!("{} missing", missing)),
            (size > 0).then(|| format!("{} wrong size", size)),
            (hash > 0).then(|| format!("{} corrupt", hash)),
            (unreadable > 0).then(|| format!("{} unreadable", unreadable)),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");

        format!(
            "{} / {} files intact: {}",
            self.files_intact, self.total_files_checked, issues
        )
    }
}

/// Check a manifest file against its companion checksum file
///
/// The checksum file's first line must hold the hash of the manifest file's
/// bytes. Returns `Ok(false)` when it does not, or when the checksum file
/// does not contain a well-formed hash.
pub fn verify_checksum_file(manifest_path: &Path, checksum_path: &Path) -> Result<bool> {
    let checksum_file = fs::File::open(checksum_path)?;
    let mut first_line = String::new();
    BufReader::new(checksum_file).read_line(&mut first_line)?;
    let expected = first_line
        .trim_start_matches('\u{feff}')
        .trim_matches(|c: char| c.is_whitespace() || c == '\0');

    if expected.len() != HASH_LEN {
        warn!("Checksum file {:?} does not contain a hash", checksum_path);
        return Ok(false);
    }

    let actual = hasher::hash_file(manifest_path)?;
    let matches = hashes_match(expected, &actual);
    if !matches {
        warn!(
            "Manifest {:?} does not match its checksum: expected {}, got {}",
            manifest_path, expected, actual
        );
    }
    Ok(matches)
}
