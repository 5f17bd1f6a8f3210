//! Manifest cache with current and previous generations
//!
//! A [`ManifestStore`] keeps, for every [`ManifestKind`], the manifest that
//! describes the installed state (`Current`) and the one that was current
//! before the last update (`Previous`). Both are read from a local base
//! directory:
//!
//! ```text
//! {local_base_dir}/GameManifest.txt       -> Game / Current
//! {local_base_dir}/GameManifest.txt.old   -> Game / Previous
//! ```
//!
//! ## Update rotation
//!
//! The store never renames files itself. An update orchestrator moves the
//! current file to its `.old` path, writes the new manifest in its place,
//! then calls [`ManifestStore::reload_manifests`]. After that the previous
//! slot reflects the pre-update state and the current slot the post-update
//! state.
//!
//! ## Thread Safety
//!
//! All slots sit behind a single mutex. Manifests are parsed outside the
//! lock and swapped in as `Arc`s, so readers always see either the old or the
//! new manifest, never a partially loaded one.
//!
//! ## Example
//!
//! ```rust,no_run
//! use patchlist::{Generation, ManifestKind, ManifestStore, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ManifestStore::new(StoreConfig::new("/opt/game", "https://cdn.example.com"));
//! store.reload_manifests(ManifestKind::Game)?;
//!
//! match store.get_manifest(ManifestKind::Game, Generation::Current) {
//!     Ok(manifest) => println!("{} files", manifest.len()),
//!     Err(e) if e.is_not_found() => println!("no update information available"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{PatchlistError, Result};
use crate::manifest::{load_manifest, Manifest, ManifestDelta};
use crate::types::{Generation, ManifestKind, StoreConfig, OLD_EXTENSION};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const LAUNCHER_REMOTE_DIR: &str = "launcher";
const GAME_REMOTE_DIR: &str = "game";

/// The two cached generations of one kind
#[derive(Debug, Default, Clone)]
struct ManifestSlots {
    current: Option<Arc<Manifest>>,
    previous: Option<Arc<Manifest>>,
}

impl ManifestSlots {
    fn slot(&self, generation: Generation) -> &Option<Arc<Manifest>> {
        match generation {
            Generation::Current => &self.current,
            Generation::Previous => &self.previous,
        }
    }

    fn slot_mut(&mut self, generation: Generation) -> &mut Option<Arc<Manifest>> {
        match generation {
            Generation::Current => &mut self.current,
            Generation::Previous => &mut self.previous,
        }
    }
}

/// What a reload changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Whether the current slot was replaced
    pub current_replaced: bool,
    /// Whether the previous slot was replaced
    pub previous_replaced: bool,
    /// Malformed lines dropped across both files
    pub skipped_lines: usize,
}

/// Owns and serves manifests of every kind
pub struct ManifestStore {
    config: StoreConfig,
    slots: Mutex<HashMap<ManifestKind, ManifestSlots>>,
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.lock();
        let loaded: Vec<_> = slots
            .iter()
            .map(|(kind, s)| (*kind, s.current.is_some(), s.previous.is_some()))
            .collect();
        f.debug_struct("ManifestStore")
            .field("config", &self.config)
            .field("loaded", &loaded)
            .finish()
    }
}

impl ManifestStore {
    /// Create an empty store; nothing is read until a reload
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration this store resolves paths and URLs with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Snapshot of one slot
    ///
    /// # Errors
    ///
    /// [`PatchlistError::ManifestNotFound`] if the slot has never been
    /// populated. Callers should treat this as "no data yet".
    pub fn get_manifest(&self, kind: ManifestKind, generation: Generation) -> Result<Arc<Manifest>> {
        let slots = self.slots.lock();
        slots
            .get(&kind)
            .and_then(|s| s.slot(generation).clone())
            .ok_or(PatchlistError::ManifestNotFound { kind, generation })
    }

    /// Whether a slot holds a manifest
    pub fn has_manifest(&self, kind: ManifestKind, generation: Generation) -> bool {
        let slots = self.slots.lock();
        slots
            .get(&kind)
            .is_some_and(|s| s.slot(generation).is_some())
    }

    /// Re-read both generations of `kind` from the local base directory
    ///
    /// A file that does not exist leaves its slot as it was. Any other I/O
    /// error aborts the reload before either slot is touched.
    pub fn reload_manifests(&self, kind: ManifestKind) -> Result<ReloadSummary> {
        let current = read_if_present(&self.manifest_path(kind, Generation::Current))?;
        let previous = read_if_present(&self.manifest_path(kind, Generation::Previous))?;

        let summary = ReloadSummary {
            current_replaced: current.is_some(),
            previous_replaced: previous.is_some(),
            skipped_lines: current.as_ref().map_or(0, |m| m.skipped_lines())
                + previous.as_ref().map_or(0, |m| m.skipped_lines()),
        };

        {
            let mut slots = self.slots.lock();
            let entry = slots.entry(kind).or_default();
            if let Some(manifest) = current {
                entry.current = Some(Arc::new(manifest));
            }
            if let Some(manifest) = previous {
                entry.previous = Some(Arc::new(manifest));
            }
        }

        info!(
            "Reloaded {} manifests (current: {}, previous: {})",
            kind, summary.current_replaced, summary.previous_replaced
        );

        Ok(summary)
    }

    /// Put an already parsed manifest into a slot, replacing its content
    pub fn install_manifest(&self, kind: ManifestKind, generation: Generation, manifest: Manifest) {
        let manifest = Arc::new(manifest);
        let mut slots = self.slots.lock();
        *slots.entry(kind).or_default().slot_mut(generation) = Some(manifest);
        debug!("Installed {} {} manifest", generation, kind);
    }

    /// Difference between the previous and the current manifest of `kind`
    ///
    /// # Errors
    ///
    /// [`PatchlistError::ManifestNotFound`] if either slot is empty.
    pub fn delta(&self, kind: ManifestKind) -> Result<ManifestDelta> {
        let (current, previous) = {
            let slots = self.slots.lock();
            let entry = slots.get(&kind).cloned().unwrap_or_default();
            (entry.current, entry.previous)
        };
        let current = current.ok_or(PatchlistError::ManifestNotFound {
            kind,
            generation: Generation::Current,
        })?;
        let previous = previous.ok_or(PatchlistError::ManifestNotFound {
            kind,
            generation: Generation::Previous,
        })?;
        Ok(current.delta_from(&previous))
    }

    /// Local path of a manifest file; the file may not exist
    pub fn manifest_path(&self, kind: ManifestKind, generation: Generation) -> PathBuf {
        let path = self.config.local_base_dir.join(kind.manifest_file_name());
        match generation {
            Generation::Current => path,
            Generation::Previous => append_extension(&path, OLD_EXTENSION),
        }
    }

    /// Local path of a kind's checksum file
    pub fn checksum_path(&self, kind: ManifestKind) -> PathBuf {
        self.config.local_base_dir.join(kind.checksum_file_name())
    }

    /// Remote URL of a kind's manifest file
    pub fn manifest_url(&self, kind: ManifestKind) -> String {
        format!("{}/{}", self.remote_dir(kind), kind.manifest_file_name())
    }

    /// Remote URL of a kind's checksum file
    pub fn manifest_checksum_url(&self, kind: ManifestKind) -> String {
        format!("{}/{}", self.remote_dir(kind), kind.checksum_file_name())
    }

    fn remote_dir(&self, kind: ManifestKind) -> String {
        let base = self.config.remote_base_url.trim_end_matches('/');
        match kind {
            ManifestKind::Launcher => format!("{}/{}", base, LAUNCHER_REMOTE_DIR),
            _ => format!("{}/{}/{}", base, GAME_REMOTE_DIR, self.config.platform),
        }
    }
}

fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(extension);
    PathBuf::from(raw)
}

fn read_if_present(path: &Path) -> Result<Option<Manifest>> {
    match load_manifest(path) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(PatchlistError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            debug!("No manifest at {:?}", path);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
