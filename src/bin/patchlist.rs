//! # Patchlist CLI
//!
//! Command-line front end for the patchlist library.
//!
//! ## Features
//! - Generate a manifest and checksum for a content tree
//! - Verify an installed tree against a manifest
//! - Inspect manifests and compare two of them
//! - Resolve local paths and remote URLs for a manifest kind
//!
//! ## Usage
//! ```bash
//! # Generate GameManifest.txt and GameManifest.checksum for a build
//! patchlist generate ./build --kind game --ignore "*.pdb"
//!
//! # Check an installation
//! patchlist verify ./install/GameManifest.txt --root ./install
//!
//! # What changed between two releases
//! patchlist diff old/GameManifest.txt new/GameManifest.txt
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use patchlist::utils::format_bytes;
use patchlist::{
    load_manifest, verify_checksum_file, CancellationToken, FileStatus, Generation,
    GenerationProgress, IntegrityChecker, ManifestGenerator, ManifestKind, ManifestStore,
    PatchlistError, Platform, ProgressCallback, Result, StoreConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Patchlist CLI - content manifests for incremental updates
#[derive(Parser)]
#[command(name = "patchlist")]
#[command(version)]
#[command(about = "Generate, inspect and verify update manifests")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON store configuration (local_base_dir, remote_base_url, platform)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a manifest and checksum for a directory
    #[command(alias = "gen")]
    Generate {
        /// Directory to list
        dir: PathBuf,

        /// Manifest kind
        #[arg(short, long, default_value = "game")]
        kind: ManifestKind,

        /// Where to write the manifest (defaults to DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Hashing threads (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Glob patterns to exclude, matched against `/`-separated paths
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Walk directories in name order
        #[arg(long)]
        sorted: bool,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// Verify installed files against a manifest
    Verify {
        /// Manifest file
        manifest: PathBuf,

        /// Install root (defaults to the manifest's directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Checksum file to validate the manifest against
        #[arg(long)]
        checksum: Option<PathBuf>,
    },

    /// Show a manifest's entries and load diagnostics
    Show {
        /// Manifest file
        manifest: PathBuf,

        /// Only print the summary
        #[arg(short, long)]
        summary: bool,
    },

    /// Compare two manifests
    Diff {
        /// Older manifest
        old: PathBuf,

        /// Newer manifest
        new: PathBuf,

        /// Show only statistics
        #[arg(long)]
        stat: bool,
    },

    /// Print local paths and remote URLs for a manifest kind
    Urls {
        /// Manifest kind
        #[arg(short, long, default_value = "game")]
        kind: ManifestKind,

        /// Remote base URL (overrides the configuration)
        #[arg(long)]
        remote: Option<String>,

        /// Platform segment (overrides the configuration)
        #[arg(long)]
        platform: Option<Platform>,

        /// Local base directory (overrides the configuration)
        #[arg(long)]
        base: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Run command
    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate { dir, kind, output, workers, ignore, sorted, follow_symlinks } => {
            cmd_generate(dir, kind, output, workers, ignore, sorted, follow_symlinks)
        }
        Commands::Verify { manifest, root, checksum } => cmd_verify(manifest, root, checksum),
        Commands::Show { manifest, summary } => cmd_show(manifest, summary),
        Commands::Diff { old, new, stat } => cmd_diff(old, new, stat),
        Commands::Urls { kind, remote, platform, base } => {
            cmd_urls(cli.config.as_deref(), kind, remote, platform, base)
        }
    }
}

/// Generate a manifest for a directory
///
/// Runs on the blocking pool of a tokio runtime; Ctrl-C cancels the run
/// after the file in progress and leaves a partial manifest without a
/// checksum.
#[allow(clippy::too_many_arguments)]
fn cmd_generate(
    dir: PathBuf,
    kind: ManifestKind,
    output: Option<PathBuf>,
    workers: Option<usize>,
    ignore: Vec<String>,
    sorted: bool,
    follow_symlinks: bool,
) -> Result<()> {
    let mut generator = ManifestGenerator::new()
        .with_ignore_patterns(ignore)
        .with_sort_by_name(sorted)
        .with_follow_symlinks(follow_symlinks);
    if let Some(output) = output {
        generator = generator.with_output_dir(output);
    }
    if let Some(workers) = workers {
        generator = generator.with_parallel_workers(workers);
    }

    println!(
        "{} {} manifest for {}",
        "Generating".blue().bold(),
        kind.to_string().yellow(),
        dir.display().to_string().cyan()
    );

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
            .map_err(|e| PatchlistError::internal(e.to_string()))?
            .progress_chars("=> "),
    );
    let pb_in_callback = pb.clone();
    let progress: ProgressCallback = Arc::new(move |p: GenerationProgress| {
        pb_in_callback.set_length(p.total_files as u64);
        pb_in_callback.set_position(p.completed as u64);
        pb_in_callback.set_message(p.relative_path);
    });

    let runtime = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();
    let outcome = runtime.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        generator.generate(dir, kind, Some(progress), cancel.clone()).await
    })?;
    pb.finish_and_clear();

    if outcome.cancelled {
        println!(
            "{} Cancelled after {} of {} files",
            "!".yellow().bold(),
            outcome.files_written,
            outcome.total_files
        );
        println!("  Partial manifest: {}", outcome.manifest_path.display().to_string().cyan());
        return Err(PatchlistError::internal("generation cancelled"));
    }

    if !outcome.rejected.is_empty() {
        println!(
            "{} {} files cannot be listed (name not representable in a manifest line):",
            "✗".red().bold(),
            outcome.rejected.len()
        );
        for path in &outcome.rejected {
            println!("  {}", path.display().to_string().red());
        }
        println!("  Incomplete manifest: {}", outcome.manifest_path.display().to_string().cyan());
        return Err(PatchlistError::internal("files with unlistable names"));
    }

    println!("{} Wrote {}", "✓".green().bold(), outcome.manifest_path.display().to_string().cyan());
    if let Some(checksum_path) = &outcome.checksum_path {
        println!("  Checksum: {}", checksum_path.display().to_string().cyan());
    }
    println!("  Files: {}", outcome.files_written.to_string().cyan());
    println!("  Size: {}", format_bytes(outcome.bytes_hashed).cyan());
    println!("  Time: {}", format_duration(round_to_millis(outcome.elapsed)).to_string().cyan());

    Ok(())
}

/// Verify installed files against a manifest
fn cmd_verify(manifest_path: PathBuf, root: Option<PathBuf>, checksum: Option<PathBuf>) -> Result<()> {
    if let Some(checksum) = &checksum {
        if verify_checksum_file(&manifest_path, checksum)? {
            println!("{} Manifest checksum matches", "✓".green().bold());
        } else {
            println!("{} Manifest checksum does not match", "✗".red().bold());
            return Err(PatchlistError::internal("manifest checksum mismatch"));
        }
    }

    let root = match root {
        Some(root) => root,
        None => manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let manifest = load_manifest(&manifest_path)?;
    if manifest.skipped_lines() > 0 {
        println!(
            "{} {} malformed lines skipped",
            "!".yellow().bold(),
            manifest.skipped_lines()
        );
    }

    println!("{} {} files under {}", "Verifying".blue().bold(), manifest.len(), root.display().to_string().cyan());
    let report = IntegrityChecker::new(&root).verify_manifest(&manifest)?;

    println!("\n{}", "Verification Report:".bold());
    println!("  Files checked: {}", report.total_files_checked);
    println!("  Intact: {}", report.files_intact.to_string().green());
    println!("  Time: {}ms", report.verification_time_ms);

    if report.is_valid() {
        println!("\n{} All files intact", "✓".green().bold());
        return Ok(());
    }

    println!("\n{}", "Problems:".red().bold());
    for check in report.failures() {
        let detail = match &check.status {
            FileStatus::Missing => "missing".to_string(),
            FileStatus::NotAFile => "not a regular file".to_string(),
            FileStatus::SizeMismatch { expected, actual } => {
                format!("size {} (expected {})", actual, expected)
            }
            FileStatus::HashMismatch { expected, actual } => {
                format!("hash {} (expected {})", actual, expected)
            }
            FileStatus::Unreadable => match &check.error {
                Some(error) => format!("unreadable: {}", error),
                None => "unreadable".to_string(),
            },
            FileStatus::Intact => continue,
        };
        println!("  {} {} {}", "✗".red(), check.relative_path, detail.dimmed());
    }

    Err(PatchlistError::internal(report.summary()))
}

/// Show manifest contents
fn cmd_show(manifest_path: PathBuf, summary_only: bool) -> Result<()> {
    let manifest = load_manifest(&manifest_path)?;

    if !summary_only {
        for entry in &manifest {
            println!(
                "{} {} {}",
                entry.hash().dimmed(),
                format!("{:>10}", format_bytes(entry.size())).cyan(),
                entry.relative_path()
            );
        }
        println!();
    }

    println!("{}", manifest_path.display().to_string().bold());
    println!("  Entries: {}", manifest.len().to_string().cyan());
    println!("  Total size: {}", format_bytes(manifest.total_size()).cyan());
    if manifest.skipped_lines() > 0 {
        println!("  Skipped lines: {}", manifest.skipped_lines().to_string().yellow());
    }
    let duplicates = manifest.duplicate_paths();
    if !duplicates.is_empty() {
        println!("  Duplicate paths: {}", duplicates.len().to_string().yellow());
        for path in duplicates {
            println!("    {}", path.yellow());
        }
    }

    Ok(())
}

/// Compare two manifests
fn cmd_diff(old_path: PathBuf, new_path: PathBuf, stat_only: bool) -> Result<()> {
    let old = load_manifest(&old_path)?;
    let new = load_manifest(&new_path)?;
    let delta = new.delta_from(&old);

    if !stat_only {
        for entry in &delta.added {
            println!("{} {}", "+".green().bold(), entry.relative_path().green());
        }
        for (before, after) in &delta.modified {
            println!(
                "{} {} ({} -> {})",
                "~".yellow().bold(),
                after.relative_path().yellow(),
                format_bytes(before.size()),
                format_bytes(after.size())
            );
        }
        for entry in &delta.removed {
            println!("{} {}", "-".red().bold(), entry.relative_path().red());
        }
        if delta.stats.has_changes() {
            println!();
        }
    }

    let stats = &delta.stats;
    println!("{}", "Changes:".bold());
    println!("  Added: {} ({})", stats.files_added.to_string().green(), format_bytes(stats.bytes_added));
    println!("  Modified: {} ({})", stats.files_modified.to_string().yellow(), format_bytes(stats.bytes_modified));
    println!("  Removed: {} ({})", stats.files_removed.to_string().red(), format_bytes(stats.bytes_removed));
    println!("  Unchanged: {}", stats.files_unchanged);
    println!("  To fetch: {}", format_bytes(stats.bytes_to_fetch()).cyan());

    Ok(())
}

/// Print resolved paths and URLs
fn cmd_urls(
    config_path: Option<&Path>,
    kind: ManifestKind,
    remote: Option<String>,
    platform: Option<Platform>,
    base: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => StoreConfig::from_json_file(path)?,
        None => StoreConfig::new(".", String::new()),
    };
    if let Some(remote) = remote {
        config.remote_base_url = remote;
    }
    if let Some(platform) = platform {
        config.platform = platform;
    }
    if let Some(base) = base {
        config.local_base_dir = base;
    }
    if config.remote_base_url.trim().is_empty() {
        return Err(PatchlistError::InvalidConfiguration(
            "no remote base URL; pass --remote or --config".to_string(),
        ));
    }

    let store = ManifestStore::new(config);
    println!("{}", kind.to_string().bold());
    println!("  Current: {}", store.manifest_path(kind, Generation::Current).display().to_string().cyan());
    println!("  Previous: {}", store.manifest_path(kind, Generation::Previous).display().to_string().cyan());
    println!("  Checksum: {}", store.checksum_path(kind).display().to_string().cyan());
    println!("  Manifest URL: {}", store.manifest_url(kind).cyan());
    println!("  Checksum URL: {}", store.manifest_checksum_url(kind).cyan());

    Ok(())
}

fn round_to_millis(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(duration.as_millis() as u64)
}
