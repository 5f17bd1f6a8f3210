//! Manifest generation
//!
//! [`ManifestGenerator`] walks a content tree and writes one manifest line
//! per file, then a checksum file over the finished manifest. It is meant
//! for publishing tools that prepare a tree for distribution.
//!
//! ## Output
//!
//! For a kind `Game` the generator writes, into the output directory
//! (the target directory unless configured otherwise):
//!
//! - `GameManifest.txt`: one `relativePath:hash:size` line per file
//! - `GameManifest.checksum`: the hash of `GameManifest.txt`'s bytes
//!
//! ## Streaming and crash behavior
//!
//! Lines are appended and flushed one at a time, so memory use does not
//! grow with the number of files and a crash leaves a truncated manifest
//! that still parses. The checksum file is only written after the last
//! line; a manifest without a checksum next to it is incomplete.
//!
//! ## Excluded files
//!
//! Names ending in one of [`EXCLUDED_SUFFIXES`] are never listed: in-progress
//! markers (`.install`, `.update`) and manifest/checksum files. Additional
//! glob patterns can be configured with
//! [`with_ignore_patterns`](ManifestGenerator::with_ignore_patterns); they
//! are matched against the `/`-separated relative path.
//!
//! Paths that cannot be written as a manifest line (not UTF-8, or containing
//! `:`, a line break or the other platform's separator) are left out with a
//! warning and reported in [`GenerationOutcome::rejected`]. Such a run is
//! not complete and gets no checksum.
//!
//! ## Parallel hashing
//!
//! `parallel_workers` threads pull files off a shared counter and send
//! their hashes to the calling thread, which writes them strictly in
//! enumeration order. A slow file only holds back the writer, not the other
//! workers; they may run up to a few files per worker ahead of it. The
//! manifest is byte-identical to what a single worker produces.
//!
//! ## Cancellation
//!
//! A [`CancellationToken`] is checked before each file is written. Once it
//! is set the run stops after the file in progress, leaves the partial
//! manifest on disk and skips the checksum.
//!
//! ## Example
//!
//! ```rust,no_run
//! use patchlist::{CancellationToken, GenerationProgress, ManifestGenerator, ManifestKind, ProgressCallback};
//! use std::sync::Arc;
//!
//! # async fn example() -> patchlist::Result<()> {
//! let generator = ManifestGenerator::new()
//!     .with_ignore_patterns(vec!["*.pdb".to_string(), "logs/**".to_string()])
//!     .with_parallel_workers(4);
//!
//! let progress: ProgressCallback = Arc::new(|p: GenerationProgress| {
//!     println!("{}/{} {}", p.completed, p.total_files, p.relative_path)
//! });
//! let cancel = CancellationToken::new();
//! let outcome = generator
//!     .generate("./build/game", ManifestKind::Game, Some(progress), cancel.clone())
//!     .await?;
//! println!("wrote {} entries", outcome.files_written);
//! # Ok(())
//! # }
//! ```

use crate::entry::ManifestEntry;
use crate::error::{PatchlistError, Result};
use crate::hasher;
use crate::types::{
    GenerationOutcome, GenerationProgress, ManifestKind, ProgressCallback, CHECKSUM_SUFFIX,
    MANIFEST_SUFFIX,
};
use crate::utils::{self, make_relative, relative_path_string, to_slash_path};
use globset::{Glob, GlobSet, GlobSetBuilder};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// File name suffixes that are never included in a manifest
pub const EXCLUDED_SUFFIXES: &[&str] = &[
    ".install",
    ".update",
    MANIFEST_SUFFIX,
    "Manifest.txt.old",
    CHECKSUM_SUFFIX,
];

/// Cooperative cancellation flag shared between a generator and its caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Files per worker that hashing may run ahead of the writer
const LOOKAHEAD_PER_WORKER: usize = 4;

/// A file selected for the manifest
#[derive(Debug, Clone)]
struct PendingFile {
    absolute: PathBuf,
    relative: String,
}

/// Result of walking the target
#[derive(Debug, Default)]
struct Enumeration {
    files: Vec<PendingFile>,
    rejected: Vec<PathBuf>,
}

/// Hash of the file at an enumeration index
type HashedFile = (usize, Result<(String, u64)>);

#[derive(Debug, Default)]
struct WriteTally {
    files_written: usize,
    bytes_hashed: u64,
    cancelled: bool,
}

/// Keeps hashing workers within `max_ahead` files of the writer
#[derive(Debug)]
struct WriteGate {
    written: Mutex<usize>,
    advanced: Condvar,
    stopped: AtomicBool,
    max_ahead: usize,
}

impl WriteGate {
    fn new(max_ahead: usize) -> Self {
        Self {
            written: Mutex::new(0),
            advanced: Condvar::new(),
            stopped: AtomicBool::new(false),
            max_ahead: max_ahead.max(1),
        }
    }

    /// Block until `index` is close enough to the writer; `false` once stopped
    fn wait_for_slot(&self, index: usize) -> bool {
        let mut written = self.written.lock();
        while index >= *written + self.max_ahead {
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }
            self.advanced.wait(&mut written);
        }
        !self.stopped.load(Ordering::SeqCst)
    }

    fn advance(&self, written: usize) {
        *self.written.lock() = written;
        self.advanced.notify_all();
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Taking the lock orders this wakeup after any waiter's flag check
        let _written = self.written.lock();
        self.advanced.notify_all();
    }
}

/// Generates manifest and checksum files for a directory tree
///
/// ## Configuration Options
///
/// - `output_dir`: where the manifest and checksum go (default: the target)
/// - `ignore_patterns`: extra glob patterns to exclude
/// - `follow_symlinks`: whether to descend into symlinked directories
/// - `parallel_workers`: hashing threads (default: number of CPUs)
/// - `sort_by_name`: walk directories in name order instead of the order
///   the file system returns
#[derive(Debug, Clone)]
pub struct ManifestGenerator {
    output_dir: Option<PathBuf>,
    ignore_patterns: Vec<String>,
    follow_symlinks: bool,
    parallel_workers: usize,
    sort_by_name: bool,
}

impl Default for ManifestGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestGenerator {
    /// Create a generator with default settings
    pub fn new() -> Self {
        Self {
            output_dir: None,
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            parallel_workers: num_cpus::get(),
            sort_by_name: false,
        }
    }

    /// Write the manifest and checksum into `dir` instead of the target
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Exclude files whose relative path matches one of these globs
    ///
    /// Patterns use `/` as separator on every platform, e.g. `*.pdb`,
    /// `logs/**`.
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Follow symbolic links while walking
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Number of hashing threads (minimum 1)
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Walk each directory in file name order
    pub fn with_sort_by_name(mut self, sort: bool) -> Self {
        self.sort_by_name = sort;
        self
    }

    /// Configured number of hashing threads
    pub fn parallel_workers(&self) -> usize {
        self.parallel_workers
    }

    /// Generate on the blocking thread pool
    ///
    /// Same as [`generate_blocking`](Self::generate_blocking) but safe to
    /// await from an async context; the walk and hashing never run on an
    /// executor thread.
    pub async fn generate(
        &self,
        target: impl Into<PathBuf>,
        kind: ManifestKind,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<GenerationOutcome> {
        let generator = self.clone();
        let target = target.into();
        tokio::task::spawn_blocking(move || {
            generator.generate_blocking(&target, kind, progress.as_ref(), &cancel)
        })
        .await?
    }

    /// Generate the manifest and checksum for `target`
    ///
    /// # Errors
    ///
    /// - [`PatchlistError::NotADirectory`] if `target` is not a directory
    /// - [`PatchlistError::InvalidPattern`] if an ignore pattern is not a glob
    /// - [`PatchlistError::WalkDir`] / [`PatchlistError::Io`] on I/O failures;
    ///   whatever was written to the manifest so far stays on disk
    pub fn generate_blocking(
        &self,
        target: &Path,
        kind: ManifestKind,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let start = Instant::now();

        if !target.is_dir() {
            return Err(PatchlistError::NotADirectory(target.to_path_buf()));
        }

        let output_dir = self.output_dir.clone().unwrap_or_else(|| target.to_path_buf());
        fs::create_dir_all(&output_dir)?;
        let manifest_path = output_dir.join(kind.manifest_file_name());
        let checksum_path = output_dir.join(kind.checksum_file_name());

        // A checksum from an earlier run must not vouch for this run's output
        match fs::remove_file(&checksum_path) {
            Ok(()) => debug!("Removed stale checksum {:?}", checksum_path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let ignore = self.build_ignore_set()?;
        let Enumeration { files, rejected } =
            self.enumerate(target, &ignore, &[&manifest_path, &checksum_path])?;
        let total_files = files.len();

        info!(
            "Generating {} manifest for {:?}: {} files, {} workers",
            kind, target, total_files, self.parallel_workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .build()?;

        let mut writer = BufWriter::new(File::create(&manifest_path)?);
        let gate = WriteGate::new(self.parallel_workers * LOOKAHEAD_PER_WORKER);
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::sync_channel::<HashedFile>(self.parallel_workers);

        let tally = pool.in_place_scope(|scope| {
            let (files, gate, next) = (&files[..], &gate, &next);
            for _ in 0..self.parallel_workers {
                let tx = tx.clone();
                scope.spawn(move |_| loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= files.len() || !gate.wait_for_slot(index) {
                        break;
                    }
                    let hashed = hasher::hash_file_with_size(&files[index].absolute);
                    if tx.send((index, hashed)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            let tally = write_in_order(files, rx, &mut writer, gate, progress, cancel);
            gate.stop();
            tally
        })?;

        let manifest_file = writer
            .into_inner()
            .map_err(|e| PatchlistError::Io(e.into_error()))?;
        manifest_file.sync_all()?;
        drop(manifest_file);

        let mut outcome = GenerationOutcome {
            manifest_path,
            checksum_path: None,
            total_files,
            files_written: tally.files_written,
            bytes_hashed: tally.bytes_hashed,
            rejected,
            cancelled: tally.cancelled,
            elapsed: start.elapsed(),
        };

        if outcome.cancelled {
            info!(
                "Generation of {} manifest cancelled after {} of {} files",
                kind, outcome.files_written, total_files
            );
            return Ok(outcome);
        }

        if !outcome.rejected.is_empty() {
            warn!(
                "{} manifest left {} unlistable files out; no checksum written",
                kind,
                outcome.rejected.len()
            );
            return Ok(outcome);
        }

        let manifest_hash = hasher::hash_file(&outcome.manifest_path)?;
        utils::atomic_write(&checksum_path, manifest_hash.as_bytes())?;
        outcome.checksum_path = Some(checksum_path);
        outcome.elapsed = start.elapsed();

        info!(
            "Wrote {} entries ({}) to {:?} in {:?}",
            outcome.files_written,
            utils::format_bytes(outcome.bytes_hashed),
            outcome.manifest_path,
            outcome.elapsed
        );

        Ok(outcome)
    }

    fn build_ignore_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| PatchlistError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| PatchlistError::InvalidPattern(e.to_string()))
    }

    /// Collect every file to list, in walk order
    fn enumerate(&self, target: &Path, ignore: &GlobSet, outputs: &[&Path]) -> Result<Enumeration> {
        let mut walker = WalkDir::new(target).follow_links(self.follow_symlinks);
        if self.sort_by_name {
            walker = walker.sort_by_file_name();
        }

        let mut found = Enumeration::default();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if outputs.iter().any(|output| *output == path) || is_excluded_name(path) {
                trace!("Excluded {:?}", path);
                continue;
            }

            let Some(relative) = relative_path_string(&make_relative(path, target)?) else {
                warn!("Cannot list {:?}: name is not representable in a manifest line", path);
                found.rejected.push(path.to_path_buf());
                continue;
            };
            if !ignore.is_empty() && ignore.is_match(to_slash_path(&relative)) {
                trace!("Ignored by pattern: {}", relative);
                continue;
            }

            found.files.push(PendingFile {
                absolute: path.to_path_buf(),
                relative,
            });
        }

        debug!(
            "Enumerated {} files under {:?} ({} rejected)",
            found.files.len(),
            target,
            found.rejected.len()
        );
        Ok(found)
    }
}

/// Write hashes in enumeration order as they arrive from the workers
fn write_in_order(
    files: &[PendingFile],
    results: Receiver<HashedFile>,
    writer: &mut BufWriter<File>,
    gate: &WriteGate,
    progress: Option<&ProgressCallback>,
    cancel: &CancellationToken,
) -> Result<WriteTally> {
    let total_files = files.len();
    let mut pending = BTreeMap::new();
    let mut tally = WriteTally::default();

    while tally.files_written < total_files {
        if cancel.is_cancelled() {
            tally.cancelled = true;
            break;
        }

        let Some(hashed) = pending.remove(&tally.files_written) else {
            match results.recv() {
                Ok((index, hashed)) => {
                    pending.insert(index, hashed);
                    continue;
                }
                Err(_) if cancel.is_cancelled() => {
                    tally.cancelled = true;
                    break;
                }
                Err(_) => {
                    return Err(PatchlistError::internal(format!(
                        "hashing stopped before file {} of {}",
                        tally.files_written + 1,
                        total_files
                    )))
                }
            }
        };

        let (hash, size) = hashed?;
        let entry = ManifestEntry::new(&files[tally.files_written].relative, hash, size)?;
        writeln!(writer, "{}", entry)?;
        writer.flush()?;

        tally.files_written += 1;
        tally.bytes_hashed += size;
        gate.advance(tally.files_written);
        trace!("{}", entry);

        if let Some(callback) = progress {
            callback(GenerationProgress {
                total_files,
                completed: tally.files_written,
                relative_path: entry.relative_path().to_string(),
                hash: entry.hash().to_string(),
                size,
            });
        }
    }

    Ok(tally)
}

fn is_excluded_name(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy();
    EXCLUDED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}
