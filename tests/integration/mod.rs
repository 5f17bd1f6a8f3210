//! Integration tests for patchlist
//!
//! Simulates the publish/install/update cycle: a publisher generates
//! manifests for successive releases, an install directory receives the
//! files and manifests, and the store, delta and integrity checker are
//! exercised against it.

use ::patchlist::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Deterministic content source
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate_file_content(&mut self, size_range: std::ops::Range<usize>) -> Vec<u8> {
        let size = self.rng.random_range(size_range);
        let mut content = vec![0u8; size];
        self.rng.fill(&mut content[..]);
        content
    }
}

/// A release: relative path (with `/`) to content
pub type Release = BTreeMap<String, Vec<u8>>;

/// Publisher and client directories for one test
pub struct UpdateTestHarness {
    pub publish_dir: TempDir,
    pub install_dir: TempDir,
    pub file_generator: FileGenerator,
    pub store: ManifestStore,
}

impl UpdateTestHarness {
    pub fn new() -> Self {
        let publish_dir = TempDir::new().unwrap();
        let install_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(StoreConfig {
            local_base_dir: install_dir.path().to_path_buf(),
            remote_base_url: "https://patch.example.com/content".to_string(),
            platform: Platform::Linux,
        });

        Self {
            publish_dir,
            install_dir,
            file_generator: FileGenerator::new(42),
            store,
        }
    }

    /// Build a release of `count` files spread over a few directories
    pub fn make_release(&mut self, count: usize) -> Release {
        (0..count)
            .map(|i| {
                let path = format!("dir_{}/file_{:03}.dat", i % 4, i);
                (path, self.file_generator.generate_file_content(1..2048))
            })
            .collect()
    }

    /// Replace the publish tree with `release` and generate its manifest
    pub fn publish(&self, release: &Release) -> anyhow::Result<GenerationOutcome> {
        let root = self.publish_dir.path();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        write_tree(root, release)?;

        let outcome = ManifestGenerator::new()
            .with_sort_by_name(true)
            .with_parallel_workers(3)
            .generate_blocking(root, ManifestKind::Game, None, &CancellationToken::new())?;
        info!("Published {} files", outcome.files_written);
        Ok(outcome)
    }

    /// Install the published manifest, rotating the old one to `.old`
    pub fn install_manifest(&self) -> anyhow::Result<()> {
        let current = self.store.manifest_path(ManifestKind::Game, Generation::Current);
        let previous = self.store.manifest_path(ManifestKind::Game, Generation::Previous);
        if current.exists() {
            fs::rename(&current, &previous)?;
        }
        fs::copy(
            self.publish_dir.path().join(ManifestKind::Game.manifest_file_name()),
            &current,
        )?;
        Ok(())
    }

    /// Copy the given published files into the install directory
    pub fn install_files<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> anyhow::Result<()> {
        for path in paths {
            let from = self.publish_dir.path().join(native(path));
            let to = self.install_dir.path().join(native(path));
            fs::create_dir_all(to.parent().unwrap())?;
            fs::copy(from, to)?;
        }
        Ok(())
    }

    pub fn checker(&self) -> IntegrityChecker {
        IntegrityChecker::new(self.install_dir.path())
    }
}

impl Default for UpdateTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn native(path: &str) -> PathBuf {
    path.split('/').collect()
}

fn write_tree(root: &Path, release: &Release) -> anyhow::Result<()> {
    for (path, content) in release {
        let full = root.join(native(path));
        fs::create_dir_all(full.parent().unwrap())?;
        fs::write(full, content)?;
    }
    Ok(())
}

fn manifest_key(path: &str) -> String {
    utils::normalize_relative_path(path)
}

#[test]
fn test_fresh_install_verifies() {
    let mut harness = UpdateTestHarness::new();
    let release = harness.make_release(30);

    let outcome = harness.publish(&release).unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.files_written, 30);

    harness.install_manifest().unwrap();
    harness.install_files(release.keys().map(String::as_str)).unwrap();

    let summary = harness.store.reload_manifests(ManifestKind::Game).unwrap();
    assert!(summary.current_replaced);
    assert!(!summary.previous_replaced);
    assert_eq!(summary.skipped_lines, 0);

    let manifest = harness.store.get_manifest(ManifestKind::Game, Generation::Current).unwrap();
    assert_eq!(manifest.len(), 30);
    assert_eq!(manifest.total_size(), release.values().map(|c| c.len() as u64).sum::<u64>());

    let report = harness.checker().verify_manifest(&manifest).unwrap();
    assert!(report.is_valid(), "{}", report.summary());
    assert_eq!(report.files_intact, 30);
}

#[test]
fn test_partial_install_lists_missing_files() {
    let mut harness = UpdateTestHarness::new();
    let release = harness.make_release(10);
    harness.publish(&release).unwrap();
    harness.install_manifest().unwrap();

    let installed: Vec<&str> = release.keys().map(String::as_str).take(6).collect();
    harness.install_files(installed.iter().copied()).unwrap();

    harness.store.reload_manifests(ManifestKind::Game).unwrap();
    let manifest = harness.store.get_manifest(ManifestKind::Game, Generation::Current).unwrap();

    let checker = harness.checker();
    let to_fetch: Vec<&str> = manifest
        .iter()
        .filter(|entry| !checker.is_intact(entry))
        .map(|entry| entry.relative_path())
        .collect();

    let expected: Vec<String> = release.keys().skip(6).map(|p| manifest_key(p)).collect();
    assert_eq!(to_fetch, expected);
}

#[test]
fn test_update_delta_between_releases() {
    let mut harness = UpdateTestHarness::new();
    let v1 = harness.make_release(12);
    harness.publish(&v1).unwrap();
    harness.install_manifest().unwrap();
    harness.install_files(v1.keys().map(String::as_str)).unwrap();

    // v2: modify two files, remove one, add two
    let mut v2 = v1.clone();
    let keys: Vec<String> = v1.keys().cloned().collect();
    v2.insert(keys[0].clone(), b"patched content".to_vec());
    v2.insert(keys[5].clone(), b"another patch".to_vec());
    v2.remove(&keys[8]);
    v2.insert("new/feature.dat".to_string(), b"feature".to_vec());
    v2.insert("new/readme.txt".to_string(), b"read me".to_vec());

    harness.publish(&v2).unwrap();
    harness.install_manifest().unwrap();

    let summary = harness.store.reload_manifests(ManifestKind::Game).unwrap();
    assert!(summary.current_replaced && summary.previous_replaced);

    let delta = harness.store.delta(ManifestKind::Game).unwrap();
    assert_eq!(delta.stats.files_added, 2);
    assert_eq!(delta.stats.files_modified, 2);
    assert_eq!(delta.stats.files_removed, 1);
    assert_eq!(delta.stats.files_unchanged, 9);
    assert_eq!(delta.stats.bytes_added, 7 + 7);
    assert_eq!(delta.stats.bytes_modified, 15 + 13);

    let removed: Vec<_> = delta.removed.iter().map(|e| e.relative_path().to_string()).collect();
    assert_eq!(removed, vec![manifest_key(&keys[8])]);

    // Before the update is applied the modified and added files are stale
    let current = harness.store.get_manifest(ManifestKind::Game, Generation::Current).unwrap();
    let report = harness.checker().verify_manifest(&current).unwrap();
    assert_eq!(report.total_files_checked, 13);
    assert_eq!(report.files_intact, 9);
    assert_eq!(report.count_where(|s| *s == FileStatus::Missing), 2);

    // Apply the update
    let changed: Vec<String> = delta
        .added
        .iter()
        .chain(delta.modified.iter().map(|(_, new)| new))
        .map(|e| utils::to_slash_path(e.relative_path()))
        .collect();
    harness.install_files(changed.iter().map(String::as_str)).unwrap();

    let report = harness.checker().verify_manifest(&current).unwrap();
    assert!(report.is_valid(), "{}", report.summary());
}

#[test]
fn test_corruption_is_detected() {
    let mut harness = UpdateTestHarness::new();
    let release = harness.make_release(5);
    harness.publish(&release).unwrap();
    harness.install_manifest().unwrap();
    harness.install_files(release.keys().map(String::as_str)).unwrap();

    let keys: Vec<&String> = release.keys().collect();

    // Same length, different bytes
    let flipped = harness.install_dir.path().join(native(keys[0]));
    let mut content = fs::read(&flipped).unwrap();
    content[0] ^= 0xFF;
    fs::write(&flipped, &content).unwrap();

    // Truncated
    let truncated = harness.install_dir.path().join(native(keys[1]));
    fs::write(&truncated, b"").unwrap();

    harness.store.reload_manifests(ManifestKind::Game).unwrap();
    let manifest = harness.store.get_manifest(ManifestKind::Game, Generation::Current).unwrap();
    let checker = harness.checker();

    let first = manifest.get(&manifest_key(keys[0])).unwrap();
    assert!(matches!(checker.check(first).unwrap(), FileStatus::HashMismatch { .. }));

    let second = manifest.get(&manifest_key(keys[1])).unwrap();
    assert_eq!(
        checker.check(second).unwrap(),
        FileStatus::SizeMismatch { expected: release[keys[1]].len() as u64, actual: 0 }
    );

    let report = checker.verify_manifest(&manifest).unwrap();
    assert_eq!(report.failures().count(), 2);
}

#[test]
fn test_checksum_detects_tampered_manifest() {
    let mut harness = UpdateTestHarness::new();
    let release = harness.make_release(4);
    let outcome = harness.publish(&release).unwrap();
    let checksum = outcome.checksum_path.unwrap();

    assert!(verify_checksum_file(&outcome.manifest_path, &checksum).unwrap());

    let mut text = fs::read_to_string(&outcome.manifest_path).unwrap();
    text.push_str(&format!("evil.exe:{}:1\n", hasher::hash_bytes(b"x")));
    fs::write(&outcome.manifest_path, text).unwrap();

    assert!(!verify_checksum_file(&outcome.manifest_path, &checksum).unwrap());
}

#[test]
fn test_truncated_manifest_keeps_complete_lines() {
    let mut harness = UpdateTestHarness::new();
    let release = harness.make_release(6);
    let outcome = harness.publish(&release).unwrap();

    // Cut the manifest in the middle of its last line, as a crash would
    let bytes = fs::read(&outcome.manifest_path).unwrap();
    let last_line_start = bytes[..bytes.len() - 1]
        .iter()
        .rposition(|b| *b == b'\n')
        .unwrap()
        + 1;
    fs::write(&outcome.manifest_path, &bytes[..last_line_start + 10]).unwrap();

    let manifest = load_manifest(&outcome.manifest_path).unwrap();
    assert_eq!(manifest.len(), 5);
    assert_eq!(manifest.skipped_lines(), 1);
}

#[test]
fn test_remote_locations() {
    let harness = UpdateTestHarness::new();
    assert_eq!(
        harness.store.manifest_url(ManifestKind::Game),
        "https://patch.example.com/content/game/linux/GameManifest.txt"
    );
    assert_eq!(
        harness.store.manifest_checksum_url(ManifestKind::Launcher),
        "https://patch.example.com/content/launcher/LauncherManifest.checksum"
    );
}

#[tokio::test]
async fn test_async_generation_with_progress() {
    let mut harness = UpdateTestHarness::new();
    let release = harness.make_release(20);
    write_tree(harness.publish_dir.path(), &release).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let progress: ProgressCallback = std::sync::Arc::new(move |p: GenerationProgress| {
        let _ = tx.send(p.completed);
    });

    let outcome = ManifestGenerator::new()
        .generate(
            harness.publish_dir.path(),
            ManifestKind::Game,
            Some(progress),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(outcome.is_complete());

    let mut reported = Vec::new();
    while let Ok(completed) = rx.try_recv() {
        reported.push(completed);
    }
    assert_eq!(reported, (1..=20).collect::<Vec<_>>());
}
