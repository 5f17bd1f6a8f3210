//! Core data types used throughout the patchlist library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Discriminators**: `ManifestKind`, `Generation`, `Platform` - which manifest
//!   file, which cache slot, which remote platform folder
//! - **Configuration**: `StoreConfig` - where manifests live locally and remotely
//! - **Operations**: `GenerationProgress`, `GenerationOutcome` - progress and
//!   results of manifest generation
//!
//! ## Examples
//!
//! ```rust
//! use patchlist::types::{ManifestKind, Platform, StoreConfig};
//! use std::path::PathBuf;
//!
//! let config = StoreConfig {
//!     local_base_dir: PathBuf::from("/opt/game"),
//!     remote_base_url: "https://cdn.example.com/patches".to_string(),
//!     platform: Platform::Linux,
//! };
//! assert_eq!(ManifestKind::Game.manifest_file_name(), "GameManifest.txt");
//! ```

use crate::error::{PatchlistError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Suffix of every manifest file name
pub const MANIFEST_SUFFIX: &str = "Manifest.txt";

/// Suffix of every checksum file name
pub const CHECKSUM_SUFFIX: &str = "Manifest.checksum";

/// Extension appended to the previous-generation manifest file
pub const OLD_EXTENSION: &str = ".old";

/// Category of content a manifest describes
///
/// The launcher is distributed from its own remote folder; every other kind
/// lives under a per-platform game folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ManifestKind {
    /// The launcher application itself
    Launcher,
    /// Game content
    Game,
}

impl ManifestKind {
    /// All kinds, in a stable order
    pub const ALL: [ManifestKind; 2] = [ManifestKind::Launcher, ManifestKind::Game];

    /// Name used in file names (`Launcher`, `Game`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestKind::Launcher => "Launcher",
            ManifestKind::Game => "Game",
        }
    }

    /// `{Kind}Manifest.txt`
    pub fn manifest_file_name(&self) -> String {
        format!("{}{}", self.as_str(), MANIFEST_SUFFIX)
    }

    /// `{Kind}Manifest.checksum`
    pub fn checksum_file_name(&self) -> String {
        format!("{}{}", self.as_str(), CHECKSUM_SUFFIX)
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestKind {
    type Err = PatchlistError;

    fn from_str(s: &str) -> Result<Self> {
        ManifestKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PatchlistError::InvalidConfiguration(format!("unknown manifest kind: {}", s)))
    }
}

/// Which of the two cached manifests of a kind to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generation {
    /// The manifest describing the installed (post-update) state
    Current,
    /// The manifest that was current before the last update
    Previous,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Current => f.write_str("current"),
            Generation::Previous => f.write_str("previous"),
        }
    }
}

/// Target platform segment used in remote game URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Windows builds
    #[serde(rename = "windows")]
    Windows,
    /// Linux builds
    #[serde(rename = "linux")]
    Linux,
    /// macOS builds
    #[serde(rename = "mac")]
    MacOs,
}

impl Platform {
    /// Platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// URL path segment for this platform
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "mac",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PatchlistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" | "win64" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "mac" | "macos" | "osx" => Ok(Platform::MacOs),
            other => Err(PatchlistError::InvalidConfiguration(format!("unknown platform: {}", other))),
        }
    }
}

/// Configuration for a [`ManifestStore`](crate::store::ManifestStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `{Kind}Manifest.txt` and `{Kind}Manifest.txt.old`
    pub local_base_dir: PathBuf,
    /// Base URL of the patch server (no trailing slash required)
    pub remote_base_url: String,
    /// Platform segment for non-launcher URLs
    #[serde(default = "Platform::current")]
    pub platform: Platform,
}

impl StoreConfig {
    /// Create a configuration for the host platform
    pub fn new(local_base_dir: impl Into<PathBuf>, remote_base_url: impl Into<String>) -> Self {
        Self {
            local_base_dir: local_base_dir.into(),
            remote_base_url: remote_base_url.into(),
            platform: Platform::current(),
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        let config: StoreConfig = serde_json::from_slice(&content)?;
        if config.remote_base_url.trim().is_empty() {
            return Err(PatchlistError::InvalidConfiguration(
                "remote_base_url must not be empty".to_string(),
            ));
        }
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        crate::utils::atomic_write(path, &json)
    }
}

/// Progress callback for manifest generation
pub type ProgressCallback = Arc<dyn Fn(GenerationProgress) + Send + Sync>;

/// Information passed to progress callbacks after each written entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationProgress {
    /// Number of files found at enumeration time
    pub total_files: usize,
    /// Entries written so far, including this one
    pub completed: usize,
    /// Relative path of the entry just written
    pub relative_path: String,
    /// Hash of the entry just written
    pub hash: String,
    /// Size of the entry just written
    pub size: u64,
}

impl GenerationProgress {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        if self.total_files == 0 {
            return None;
        }
        Some((self.completed as f32 / self.total_files as f32) * 100.0)
    }
}

/// Result of a generation run
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Manifest file that was written (possibly partial when cancelled)
    pub manifest_path: PathBuf,
    /// Checksum file, present only when the run completed
    pub checksum_path: Option<PathBuf>,
    /// Listable files found at enumeration time
    pub total_files: usize,
    /// Files left out because their name cannot be written as a manifest
    /// line (not UTF-8, or containing `:`, a line break or a foreign
    /// separator)
    pub rejected: Vec<PathBuf>,
    /// Entries written to the manifest
    pub files_written: usize,
    /// Sum of sizes of written entries
    pub bytes_hashed: u64,
    /// Whether the run stopped early because of cancellation
    pub cancelled: bool,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl GenerationOutcome {
    /// Whether every file in the tree made it into the manifest
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.rejected.is_empty() && self.files_written == self.total_files
    }
}
