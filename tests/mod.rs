//! Main test module for patchlist
//!
//! This module includes all test suites:
//! - Integration tests for publish/install/update scenarios
//! - Property-based tests for entry and manifest invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::patchlist::*;
    use std::fs;
    use tempfile::TempDir;

    fn generate(dir: &std::path::Path, kind: ManifestKind) -> GenerationOutcome {
        ManifestGenerator::new()
            .with_sort_by_name(true)
            .generate_blocking(dir, kind, None, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let outcome = generate(temp_dir.path(), ManifestKind::Game);
        assert!(outcome.is_complete());
        assert_eq!(outcome.total_files, 0);
        assert_eq!(fs::read(&outcome.manifest_path).unwrap().len(), 0);

        // Checksum of an empty manifest is the hash of no bytes
        let checksum = fs::read_to_string(outcome.checksum_path.unwrap()).unwrap();
        assert_eq!(checksum.trim(), "D41D8CD98F00B204E9800998ECF8427E");
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.multiple.dots.txt",
            "UPPERCASE.TXT",
            "数据.bin",
            ".hidden",
        ];
        for name in &special_names {
            fs::write(temp_dir.path().join(name), name.as_bytes()).unwrap();
        }

        let outcome = generate(temp_dir.path(), ManifestKind::Game);
        let manifest = load_manifest(&outcome.manifest_path).unwrap();
        assert_eq!(manifest.len(), special_names.len());
        assert_eq!(manifest.skipped_lines(), 0);

        let checker = IntegrityChecker::new(temp_dir.path());
        for name in &special_names {
            let entry = manifest.get(name).unwrap();
            assert!(checker.is_intact(entry), "{} should be intact", name);
        }
    }

    #[test]
    fn test_launcher_and_game_side_by_side() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("launcher.exe"), b"launcher").unwrap();

        generate(temp_dir.path(), ManifestKind::Launcher);
        // The launcher manifest must not show up in the game manifest
        let game = generate(temp_dir.path(), ManifestKind::Game);

        let manifest = load_manifest(&game.manifest_path).unwrap();
        let paths: Vec<_> = manifest.iter().map(|e| e.relative_path()).collect();
        assert_eq!(paths, vec!["launcher.exe"]);
    }

    #[test]
    fn test_file_replaced_by_directory() {
        let temp_dir = TempDir::new().unwrap();
        let entry = ManifestEntry::new("assets", hasher::hash_bytes(b"x"), 1).unwrap();
        fs::create_dir(temp_dir.path().join("assets")).unwrap();

        let checker = IntegrityChecker::new(temp_dir.path());
        assert_eq!(checker.check(&entry).unwrap(), FileStatus::NotAFile);
        assert!(!checker.is_intact(&entry));
    }

    #[test]
    fn test_manifest_with_only_garbage() {
        let manifest = load_manifest_from_reader(&b"not a manifest\n\x00\x00\n:::\n"[..]).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.skipped_lines(), 2);
    }

    #[test]
    fn test_store_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(StoreConfig::new(temp_dir.path(), "https://patch.example.com"));

        let summary = store.reload_manifests(ManifestKind::Launcher).unwrap();
        assert!(!summary.current_replaced);
        assert!(!summary.previous_replaced);

        for generation in [Generation::Current, Generation::Previous] {
            let err = store.get_manifest(ManifestKind::Launcher, generation).unwrap_err();
            assert!(err.is_not_found());
        }
    }
}
