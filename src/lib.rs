//! # Patchlist - content manifests for incremental updates
//!
//! A library for describing a distributed content tree as a list of files
//! with their content hashes and sizes, and for using that list to decide
//! which local files need to be fetched again.
//!
//! ## Overview
//!
//! Patchlist provides the manifest layer of an updater:
//! - Parse and write manifest lines (`relativePath:hash:size`)
//! - Hash file contents (MD5, uppercase hex)
//! - Keep the current and previous manifest of each kind in memory
//! - Compute what changed between two manifests
//! - Generate a manifest and its checksum for a content tree, in parallel,
//!   with progress reporting and cancellation
//! - Check whether installed files still match their manifest entries
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use patchlist::{IntegrityChecker, ManifestKind, ManifestStore, Generation, StoreConfig};
//!
//! # fn main() -> patchlist::Result<()> {
//! let store = ManifestStore::new(StoreConfig::new(
//!     "/opt/game",
//!     "https://patch.example.com/content",
//! ));
//! store.reload_manifests(ManifestKind::Game)?;
//!
//! let manifest = store.get_manifest(ManifestKind::Game, Generation::Current)?;
//! let checker = IntegrityChecker::new("/opt/game");
//! let stale: Vec<_> = manifest
//!     .iter()
//!     .filter(|entry| !checker.is_intact(entry))
//!     .collect();
//! println!("{} files need to be fetched", stale.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Manifest Files
//!
//! For each kind the local base directory holds
//!
//! - `{Kind}Manifest.txt`: the manifest of the installed state
//! - `{Kind}Manifest.txt.old`: the manifest before the last update
//!
//! and the publishing side additionally writes `{Kind}Manifest.checksum`
//! next to a freshly generated manifest.
//!
//! Lines that fail to parse are skipped when loading; a truncated or
//! partially corrupted manifest still yields every valid entry.
//!
//! ## Thread Safety
//!
//! [`ManifestStore`] can be shared between threads. Loaded manifests are
//! handed out as `Arc<Manifest>` snapshots and never change; a reload
//! replaces them as a whole.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with [`PatchlistError`].
//!
//! ## Module Organization
//!
//! - [`entry`]: a single manifest line
//! - [`manifest`]: ordered entry lists, loading and deltas
//! - [`store`]: current/previous manifests per kind and their locations
//! - [`generator`]: manifest generation for a directory tree
//! - [`verification`]: checking installed files against entries
//! - [`hasher`]: content hashing
//! - [`types`]: common types and configuration
//! - [`error`]: error types

// Public API modules
pub mod entry;
pub mod error;
pub mod generator;
pub mod hasher;
pub mod manifest;
pub mod store;
pub mod types;
pub mod utils;
pub mod verification;

// Re-export main types for convenience
pub use entry::ManifestEntry;
pub use error::{PatchlistError, Result};
pub use generator::{CancellationToken, ManifestGenerator};
pub use manifest::{load_manifest, load_manifest_from_reader, DeltaStats, Manifest, ManifestDelta};
pub use store::{ManifestStore, ReloadSummary};
pub use types::*;
pub use verification::{
    is_intact, verify_checksum_file, FileCheck, FileStatus, IntegrityChecker, VerificationReport,
};
