//! Property-based testing for patchlist
//!
//! Uses proptest to check entry parsing, equality and manifest loading
//! against randomly generated inputs.

use ::patchlist::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Relative paths with `/` separators and no colons
fn path_strategy() -> impl Strategy<Value = String> {
    let dir_strategy = prop::collection::vec("[a-z0-9_]{1,8}", 0..=3);
    let filename_strategy = prop_oneof![
        "file[0-9]{1,3}\\.(dat|pak|txt)",
        "[a-zA-Z]{1,8}\\.[a-z]{1,3}",
        "[a-z]{3,10}",
    ];
    (dir_strategy, filename_strategy).prop_map(|(dirs, filename)| {
        let mut parts = dirs;
        parts.push(filename);
        parts.join("/")
    })
}

fn hash_strategy() -> impl Strategy<Value = String> {
    "[0-9A-F]{32}"
}

fn entry_strategy() -> impl Strategy<Value = ManifestEntry> {
    (path_strategy(), hash_strategy(), 0..=i64::MAX as u64)
        .prop_map(|(path, hash, size)| ManifestEntry::new(path, hash, size).unwrap())
}

/// Raw manifest lines as another platform might write them: mixed `/` and
/// `\` separators and sometimes a leading separator
fn raw_line_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(("[a-z0-9_.]{0,2}[a-z0-9_]{1,6}", prop::bool::ANY), 1..=5),
        prop::option::of(prop::bool::ANY),
        hash_strategy(),
        0..=i64::MAX as u64,
    )
        .prop_map(|(segments, leading, hash, size)| {
            let mut path = String::new();
            if let Some(backslash) = leading {
                path.push(if backslash { '\\' } else { '/' });
            }
            for (i, (segment, backslash)) in segments.iter().enumerate() {
                if i > 0 {
                    path.push(if *backslash { '\\' } else { '/' });
                }
                path.push_str(segment);
            }
            format!("{}:{}:{}", path, hash, size)
        })
}

/// Non-blank lines that can never parse
fn garbage_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{1,20}[a-z]",
        "[a-z]{1,8}:[0-9A-F]{31}:[0-9]{1,4}",
        "[a-z]{1,8}:[0-9A-F]{32}:-[1-9][0-9]{0,3}",
        "[a-z]{1,8}:[0-9A-F]{32}:[0-9]{1,4}:[a-z]{1,4}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Serializing and parsing yields an equal entry
    #[test]
    fn line_roundtrip(entry in entry_strategy()) {
        let parsed = ManifestEntry::parse(&entry.to_line()).unwrap();
        prop_assert_eq!(&parsed, &entry);
        prop_assert_eq!(parsed.to_line(), entry.to_line());
    }

    /// Parsing a raw line, serializing it and parsing again changes nothing
    #[test]
    fn raw_line_parse_is_idempotent(raw in raw_line_strategy()) {
        let parsed = ManifestEntry::parse(&raw).unwrap();
        let reparsed = ManifestEntry::parse(&parsed.to_line()).unwrap();
        prop_assert_eq!(&reparsed, &parsed);
        prop_assert_eq!(reparsed.to_line(), parsed.to_line());
        prop_assert!(!parsed.relative_path().contains(utils::FOREIGN_SEPARATOR));
        prop_assert!(!parsed.relative_path().starts_with(utils::HOST_SEPARATOR));
    }

    /// Hash case never affects equality or hashing
    #[test]
    fn hash_case_insensitive(entry in entry_strategy()) {
        let lower = ManifestEntry::new(
            entry.relative_path(),
            entry.hash().to_lowercase(),
            entry.size(),
        ).unwrap();
        prop_assert_eq!(&lower, &entry);

        let set: HashSet<ManifestEntry> = [entry.clone(), lower].into_iter().collect();
        prop_assert_eq!(set.len(), 1);
    }

    /// Any difference in size breaks equality
    #[test]
    fn size_matters(entry in entry_strategy(), delta in 1u64..1000) {
        let other = ManifestEntry::new(
            entry.relative_path(),
            entry.hash(),
            entry.size().wrapping_add(delta) % (i64::MAX as u64 + 1),
        ).unwrap();
        prop_assert_ne!(other, entry);
    }

    /// Trailing line noise is ignored by the parser
    #[test]
    fn line_endings_ignored(entry in entry_strategy(), noise in "[\\r\\n\\x00]{0,4}") {
        let parsed = ManifestEntry::parse(&format!("{}{}", entry.to_line(), noise)).unwrap();
        prop_assert_eq!(parsed, entry);
    }

    /// Garbage never parses
    #[test]
    fn garbage_rejected(line in garbage_strategy()) {
        let err = ManifestEntry::parse(&line).unwrap_err();
        prop_assert!(err.is_malformed());
    }

    /// Loading keeps valid lines in order and counts the rest
    #[test]
    fn load_partitions_lines(
        lines in prop::collection::vec(
            prop_oneof![
                entry_strategy().prop_map(Ok::<ManifestEntry, String>),
                garbage_strategy().prop_map(Err::<ManifestEntry, String>),
            ],
            0..60,
        ),
        crlf in any::<bool>(),
    ) {
        let eol = if crlf { "\r\n" } else { "\n" };
        let mut text = String::new();
        let mut expected = Vec::new();
        let mut garbage = 0usize;
        for line in &lines {
            match line {
                Ok(entry) => {
                    text.push_str(&entry.to_line());
                    expected.push(entry.clone());
                }
                Err(raw) => {
                    text.push_str(raw);
                    garbage += 1;
                }
            }
            text.push_str(eol);
        }

        let manifest = load_manifest_from_reader(text.as_bytes()).unwrap();
        prop_assert_eq!(manifest.entries(), &expected[..]);
        prop_assert_eq!(manifest.skipped_lines(), garbage);
    }

    /// A manifest compared with itself has no changes
    #[test]
    fn delta_with_self_is_empty(entries in prop::collection::vec(entry_strategy(), 0..40)) {
        let manifest = Manifest::from_entries(entries);
        let delta = manifest.delta_from(&manifest);
        prop_assert!(!delta.stats.has_changes());
        prop_assert!(delta.added.is_empty() && delta.modified.is_empty() && delta.removed.is_empty());
    }

    /// Against an empty manifest every distinct path is added
    #[test]
    fn delta_from_empty_adds_everything(entries in prop::collection::vec(entry_strategy(), 0..40)) {
        let distinct: HashSet<String> = entries.iter().map(|e| e.relative_path().to_string()).collect();
        let manifest = Manifest::from_entries(entries);
        let delta = manifest.delta_from(&Manifest::default());
        prop_assert_eq!(delta.stats.files_added, distinct.len());
        prop_assert_eq!(delta.stats.files_removed, 0);

        let reverse = Manifest::default().delta_from(&manifest);
        prop_assert_eq!(reverse.stats.files_removed, distinct.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// A generated manifest lists every file with the hash of its content
    #[test]
    fn generated_manifest_matches_tree(
        files in prop::collection::btree_map(path_strategy(), prop::collection::vec(any::<u8>(), 0..512), 1..20),
        workers in 1usize..5,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();

        // Drop paths that collide with a directory of another path
        let mut written = Vec::new();
        for (path, content) in &files {
            let full: PathBuf = temp_dir.path().join(path.split('/').collect::<PathBuf>());
            if fs::create_dir_all(full.parent().unwrap()).is_ok() && !full.is_dir() && fs::write(&full, content).is_ok() {
                written.push(path.clone());
            }
        }
        // A file created earlier may since have had to be a directory
        written.retain(|path| temp_dir.path().join(path.split('/').collect::<PathBuf>()).is_file());

        let outcome = ManifestGenerator::new()
            .with_output_dir(output_dir.path())
            .with_parallel_workers(workers)
            .generate_blocking(temp_dir.path(), ManifestKind::Game, None, &CancellationToken::new())
            .unwrap();
        prop_assert!(outcome.is_complete());

        let manifest = load_manifest(&outcome.manifest_path).unwrap();
        prop_assert_eq!(manifest.len(), written.len());

        let checker = IntegrityChecker::new(temp_dir.path());
        for path in &written {
            let entry = manifest.get(&utils::normalize_relative_path(path)).unwrap();
            prop_assert_eq!(entry.size(), files[path].len() as u64);
            prop_assert!(entry.hash_matches(&hasher::hash_bytes(&files[path])));
            prop_assert!(checker.is_intact(entry));
        }
    }
}
