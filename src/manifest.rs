//! Manifests and manifest files
//!
//! A [`Manifest`] is the ordered list of entries read from a manifest file.
//! Order is whatever the generator's directory walk produced; entries are
//! neither sorted nor deduplicated.
//!
//! Loading is forgiving: a line that does not parse is dropped and counted
//! in [`Manifest::skipped_lines`], so a single corrupt line never discards
//! the rest of the manifest.
//!
//! ```rust
//! use patchlist::manifest::load_manifest_from_reader;
//!
//! let text = "a.txt:5D41402ABC4B2A76B9719D911017C592:5\n\
//!             garbage\n\
//!             b.txt:D41D8CD98F00B204E9800998ECF8427E:0\n";
//! let manifest = load_manifest_from_reader(text.as_bytes())?;
//! assert_eq!(manifest.len(), 2);
//! assert_eq!(manifest.skipped_lines(), 1);
//! # Ok::<(), patchlist::PatchlistError>(())
//! ```

use crate::entry::ManifestEntry;
use crate::error::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, trace, warn};

const UTF8_BOM: &str = "\u{feff}";

/// Ordered list of manifest entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    skipped_lines: usize,
}

impl Manifest {
    /// Create a manifest from entries that are already parsed
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        Self { entries, skipped_lines: 0 }
    }

    /// Entries in file order
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Iterate over entries in file order
    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-blank lines that were dropped because they did not parse
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Sum of all entry sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size()).sum()
    }

    /// First entry with exactly this relative path
    pub fn get(&self, relative_path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.relative_path() == relative_path)
    }

    /// Relative paths that occur more than once, in first-seen order
    pub fn duplicate_paths(&self) -> Vec<&str> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut duplicates = Vec::new();
        for entry in &self.entries {
            let count = counts.entry(entry.relative_path()).or_insert(0);
            *count += 1;
            if *count == 2 {
                duplicates.push(entry.relative_path());
            }
        }
        duplicates
    }

    /// Compare `previous` (the older manifest) against `self`
    ///
    /// Entries are matched by relative path. When a path occurs more than
    /// once in a manifest the last occurrence wins. Results follow the entry
    /// order of the manifest they come from.
    pub fn delta_from(&self, previous: &Manifest) -> ManifestDelta {
        let old_last = last_occurrences(previous);
        let new_last = last_occurrences(self);

        let mut delta = ManifestDelta::default();

        for entry in winners(self, &new_last) {
            match old_last.get(entry.relative_path()) {
                Some(&i) if previous.entries[i] != *entry => {
                    delta.stats.files_modified += 1;
                    delta.stats.bytes_modified += entry.size();
                    delta.modified.push((previous.entries[i].clone(), entry.clone()));
                }
                Some(_) => delta.stats.files_unchanged += 1,
                None => {
                    delta.stats.files_added += 1;
                    delta.stats.bytes_added += entry.size();
                    delta.added.push(entry.clone());
                }
            }
        }

        for entry in winners(previous, &old_last) {
            if !new_last.contains_key(entry.relative_path()) {
                delta.stats.files_removed += 1;
                delta.stats.bytes_removed += entry.size();
                delta.removed.push(entry.clone());
            }
        }

        debug!(
            "Manifest delta: {} added, {} modified, {} removed, {} unchanged",
            delta.stats.files_added,
            delta.stats.files_modified,
            delta.stats.files_removed,
            delta.stats.files_unchanged
        );

        delta
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Index of the last entry for each relative path
fn last_occurrences(manifest: &Manifest) -> HashMap<&str, usize> {
    manifest
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.relative_path(), i))
        .collect()
}

/// The last occurrence of each path, in manifest order
fn winners<'a>(
    manifest: &'a Manifest,
    last: &'a HashMap<&'a str, usize>,
) -> impl Iterator<Item = &'a ManifestEntry> + 'a {
    manifest
        .entries
        .iter()
        .enumerate()
        .filter(move |(i, e)| last.get(e.relative_path()) == Some(i))
        .map(|(_, e)| e)
}

/// Statistics about the difference between two manifests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaStats {
    /// Paths only in the newer manifest
    pub files_added: usize,
    /// Paths in both with a different hash or size
    pub files_modified: usize,
    /// Paths only in the older manifest
    pub files_removed: usize,
    /// Paths in both with identical entries
    pub files_unchanged: usize,
    /// Total size of added entries
    pub bytes_added: u64,
    /// Total size of modified entries (new size)
    pub bytes_modified: u64,
    /// Total size of removed entries
    pub bytes_removed: u64,
}

impl DeltaStats {
    /// Whether anything changed
    pub fn has_changes(&self) -> bool {
        self.files_added > 0 || self.files_modified > 0 || self.files_removed > 0
    }

    /// Bytes a client has to fetch to go from old to new
    pub fn bytes_to_fetch(&self) -> u64 {
        self.bytes_added + self.bytes_modified
    }
}

/// Entries that differ between two manifests
#[derive(Debug, Clone, Default)]
pub struct ManifestDelta {
    /// Entries only in the newer manifest
    pub added: Vec<ManifestEntry>,
    /// Entries in both whose content differs, as (old, new)
    pub modified: Vec<(ManifestEntry, ManifestEntry)>,
    /// Entries only in the older manifest
    pub removed: Vec<ManifestEntry>,
    /// Summary counts
    pub stats: DeltaStats,
}

/// Load a manifest file
///
/// # Errors
///
/// Returns [`PatchlistError::Io`](crate::PatchlistError::Io) if the file
/// cannot be opened or read. Malformed lines are not errors.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    debug!("Loading manifest from {:?}", path);
    let file = File::open(path)?;
    load_manifest_from_reader(BufReader::new(file))
}

/// Load a manifest from any buffered reader
///
/// Lines are split on `\n`; carriage returns and NUL bytes are handled by
/// [`ManifestEntry::parse`]. Blank lines are ignored. A UTF-8 byte order
/// mark at the start of the input is skipped. Lines that are not valid
/// UTF-8 count as malformed.
pub fn load_manifest_from_reader<R: BufRead>(reader: R) -> Result<Manifest> {
    let mut entries = Vec::new();
    let mut skipped_lines = 0usize;

    for (index, line) in reader.split(b'\n').enumerate() {
        let bytes = line?;
        let Ok(text) = std::str::from_utf8(&bytes) else {
            trace!("Line {} is not valid UTF-8", index + 1);
            skipped_lines += 1;
            continue;
        };
        let text = if index == 0 {
            text.strip_prefix(UTF8_BOM).unwrap_or(text)
        } else {
            text
        };

        if text.trim_matches(|c: char| c.is_whitespace() || c == '\0').is_empty() {
            continue;
        }

        match ManifestEntry::parse(text) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                trace!("Skipping line {}: {}", index + 1, e);
                skipped_lines += 1;
            }
        }
    }

    if skipped_lines > 0 {
        warn!("Dropped {} malformed manifest line(s)", skipped_lines);
    }

    Ok(Manifest { entries, skipped_lines })
}
