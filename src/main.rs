//! lumidisk - directory inventory, duplicate finder and incremental re-scanner.
//!
//! Usage:
//!   lumidisk scan [PATH]          Full scan summary
//!   lumidisk rescan [PATH]        Incremental scan against the last snapshot
//!   lumidisk duplicates [PATH]    Find byte-identical files
//!   lumidisk export [PATH]        Export an inventory as JSON or CSV
//!   lumidisk snapshots <ACTION>   Inspect or prune stored snapshots

mod export;
mod logging;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tokio::sync::broadcast::error::RecvError;

use lumidisk_analyze::{DuplicateConfig, DuplicateFinder};
use lumidisk_core::{Inventory, ScanConfig};
use lumidisk_scan::{JwalkScanner, ScanProgress};
use lumidisk_snapshot::{IncrementalScanner, ScanMode, SnapshotStore};

use crate::export::{ExportFormat, format_time};

#[derive(Parser)]
#[command(
    name = "lumidisk",
    version,
    about = "Directory inventory, duplicate finder and incremental re-scanner",
    long_about = "lumidisk inventories a directory tree, reports where the space goes, \
                  finds byte-identical files, and re-scans cheaply by diffing against \
                  the last stored snapshot."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Snapshot store directory (defaults to the per-user data directory)
    #[arg(long, global = true, value_name = "DIR")]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct ScanArgs {
    /// Path to scan
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Maximum depth to descend
    #[arg(short = 'd', long)]
    max_depth: Option<u32>,

    /// Glob pattern of names to skip (repeatable)
    #[arg(short = 'x', long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// Worker threads (0 = available parallelism)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Skip hidden files and directories
    #[arg(long)]
    no_hidden: bool,
}

impl ScanArgs {
    fn config(&self) -> Result<ScanConfig> {
        let root = self
            .path
            .canonicalize()
            .with_context(|| format!("Invalid path: {}", self.path.display()))?;
        ScanConfig::builder()
            .root(root)
            .follow_symlinks(self.follow_symlinks)
            .max_depth(self.max_depth)
            .ignore_patterns(self.ignore.clone())
            .threads(self.threads)
            .include_hidden(!self.no_hidden)
            .build()
            .map_err(|e| eyre!("Invalid scan options: {e}"))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Full scan and show summary
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Number of extensions to list
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        /// Store the result as a snapshot for later re-scans
        #[arg(short, long)]
        save: bool,
    },

    /// Incremental scan against the latest snapshot of PATH
    Rescan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Ignore stored snapshots and walk the whole tree
        #[arg(long)]
        full: bool,

        /// Number of extensions to list
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,
    },

    /// Find duplicate files
    Duplicates {
        #[command(flatten)]
        scan: ScanArgs,

        /// Minimum file size to consider (e.g., "1KB", "1MB")
        #[arg(short, long, default_value = "1B")]
        min_size: String,

        /// Maximum number of duplicate groups to show (0 = all)
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Export an inventory
    Export {
        #[command(flatten)]
        scan: ScanArgs,

        /// Export format
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Reuse the latest snapshot through an incremental scan
        #[arg(short, long)]
        incremental: bool,
    },

    /// Manage stored snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List snapshots of a root, or summarize the store
    List {
        /// Root whose snapshots to list
        path: Option<PathBuf>,
    },
    /// Delete every snapshot of a root
    Purge {
        /// Root whose snapshots to delete
        path: PathBuf,
    },
    /// Delete every snapshot in the store
    Clear,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    match cli.command {
        Command::Scan { scan, top, save } => {
            run_scan(&scan, top, save.then_some(cli.store_dir.as_deref()))?;
        }
        Command::Rescan { scan, full, top } => {
            run_rescan(&scan, full, top, cli.store_dir.as_deref())?;
        }
        Command::Duplicates {
            scan,
            min_size,
            top,
            format,
        } => {
            run_duplicates(&scan, &min_size, top, format)?;
        }
        Command::Export {
            scan,
            format,
            output,
            incremental,
        } => {
            let store_dir = incremental.then_some(cli.store_dir.as_deref());
            run_export(&scan, format, output, store_dir)?;
        }
        Command::Snapshots { action } => {
            run_snapshots(action, cli.store_dir.as_deref())?;
        }
    }

    Ok(())
}

/// Open the store at `dir`, or the per-user default.
fn open_store(dir: Option<&Path>) -> Result<SnapshotStore> {
    match dir {
        Some(dir) => Ok(SnapshotStore::new(dir)),
        None => SnapshotStore::open_default().context("Cannot locate snapshot store"),
    }
}

/// Run a full scan, printing progress to stderr while it runs.
fn full_scan(config: &ScanConfig) -> Result<Inventory> {
    eprintln!("Scanning {}...", config.root.display());

    let scanner = JwalkScanner::new();
    let mut rx = scanner.subscribe();
    let reporter = thread::spawn(move || {
        loop {
            match rx.blocking_recv() {
                Ok(progress) if progress.finished => break,
                Ok(progress) => print_progress(&progress),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        eprint!("\r{}\r", " ".repeat(60));
    });

    let result = scanner.scan(config);
    drop(scanner);
    let _ = reporter.join();

    result.context("Scan failed")
}

fn print_progress(progress: &ScanProgress) {
    eprint!(
        "\r {} files, {} dirs, {} ",
        progress.files_scanned,
        progress.dirs_scanned,
        format_size(progress.bytes_scanned)
    );
    let _ = io::stderr().flush();
}

/// Run a full scan and display summary.
fn run_scan(args: &ScanArgs, top_n: usize, save_to: Option<Option<&Path>>) -> Result<()> {
    let config = args.config()?;

    let inventory = match save_to {
        Some(store_dir) => {
            let scanner = IncrementalScanner::new(open_store(store_dir)?);
            let result = scanner.full_scan(&config).context("Scan failed")?;
            if let Some(path) = &result.snapshot_path {
                eprintln!("Snapshot saved to {}", path.display());
            }
            result.inventory
        }
        None => full_scan(&config)?,
    };

    print_summary(&config.root, &inventory, top_n);
    Ok(())
}

/// Run an incremental scan and display summary.
fn run_rescan(args: &ScanArgs, full: bool, top_n: usize, store_dir: Option<&Path>) -> Result<()> {
    let config = args.config()?;
    let scanner = IncrementalScanner::new(open_store(store_dir)?);

    eprintln!("Re-scanning {}...", config.root.display());
    let result = if full {
        scanner.full_scan(&config)
    } else {
        scanner.scan(&config)
    }
    .context("Scan failed")?;

    match &result.mode {
        ScanMode::Full => println!(" No usable snapshot: full scan"),
        ScanMode::Unchanged => println!(" Unchanged since last snapshot"),
        ScanMode::Rescanned(changes) => {
            println!(
                " {} added, {} modified, {} removed",
                changes.added.len(),
                changes.modified.len(),
                changes.removed.len()
            );
        }
    }

    print_summary(&config.root, &result.inventory, top_n);
    Ok(())
}

fn print_summary(root: &Path, inventory: &Inventory, top_n: usize) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", root.display(), format_size(inventory.total_size()));
    println!(
        " {} files, {} directories",
        inventory.total_files(),
        inventory.total_dirs()
    );
    println!(" Scanned in {:.2}s", inventory.scan_duration.as_secs_f64());
    println!("{}", "─".repeat(60));

    let top = inventory.top_extensions(top_n);
    if !top.is_empty() {
        println!();
        println!(" Largest extensions:");
        let total = inventory.total_size();
        for (ext, size) in top {
            let ratio = if total > 0 {
                size as f64 / total as f64
            } else {
                0.0
            };
            println!(
                "   .{:<12} {:>10} {:>5.1}% {}",
                truncate(ext, 12),
                format_size(size),
                ratio * 100.0,
                make_bar(ratio, 20)
            );
        }
    }

    if inventory.has_warnings() {
        println!();
        println!("{} warning(s) during scan", inventory.warnings.len());
    }
}

/// Run duplicate detection.
fn run_duplicates(args: &ScanArgs, min_size: &str, top_n: usize, format: OutputFormat) -> Result<()> {
    let config = args.config()?;
    let min_bytes = parse_size(min_size)?;

    let mut inventory = full_scan(&config)?;

    eprintln!("Finding duplicates (min size: {min_size})...");

    let dup_config = DuplicateConfig::builder()
        .min_size(min_bytes.max(1))
        .threads(args.threads)
        .max_groups(top_n)
        .build()
        .map_err(|e| eyre!("Invalid duplicate options: {e}"))?;

    let finder = DuplicateFinder::with_config(dup_config);
    let report = finder.find_in_inventory(&mut inventory);

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" Duplicate File Report");
            println!("{}", "─".repeat(70));
            println!();

            if report.groups.is_empty() {
                println!(" No duplicate files found.");
            } else {
                println!(
                    " Found {} duplicate groups ({} files)",
                    report.groups.len(),
                    report.total_duplicate_files()
                );
                println!(" Total wasted space: {}", format_size(report.total_wasted_space));
                println!();

                for (i, group) in report.groups.iter().enumerate() {
                    println!(
                        " Group {} ({} files, {} each, {} wasted)",
                        i + 1,
                        group.count(),
                        format_size(group.size),
                        format_size(group.wasted_bytes)
                    );
                    for member in &group.members {
                        println!("   {}  {}", format_time(member.modified), member.path.display());
                    }
                    println!();
                }
            }

            if !report.warnings.is_empty() {
                println!("{} file(s) could not be read", report.warnings.len());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Export an inventory to a file or stdout.
fn run_export(
    args: &ScanArgs,
    format: ExportFormat,
    output: Option<PathBuf>,
    store_dir: Option<Option<&Path>>,
) -> Result<()> {
    let config = args.config()?;

    let inventory = match store_dir {
        Some(dir) => {
            let scanner = IncrementalScanner::new(open_store(dir)?);
            scanner.scan(&config).context("Scan failed")?.inventory
        }
        None => full_scan(&config)?,
    };

    match output {
        Some(output_path) => {
            let file = File::create(&output_path)
                .with_context(|| format!("Cannot create {}", output_path.display()))?;
            export::export(&inventory, format, BufWriter::new(file))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            let stdout = io::stdout();
            export::export(&inventory, format, stdout.lock())?;
            println!();
        }
    }

    Ok(())
}

/// Inspect or prune the snapshot store.
fn run_snapshots(action: SnapshotAction, store_dir: Option<&Path>) -> Result<()> {
    let store = open_store(store_dir)?;

    match action {
        SnapshotAction::List { path: Some(path) } => {
            let snapshots = store.snapshots(&path);
            if snapshots.is_empty() {
                println!(" No snapshots for {}", path.display());
            }
            for snapshot in snapshots {
                println!(
                    " {}  {:>8} files  {:>10}",
                    snapshot.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    snapshot.inventory.total_files(),
                    format_size(snapshot.inventory.total_size())
                );
            }
        }
        SnapshotAction::List { path: None } => {
            println!(" Store: {}", store.dir().display());
            println!(
                " {} of {} snapshot(s), {}",
                store.len(),
                store.max_snapshots(),
                format_size(store.cache_size())
            );
        }
        SnapshotAction::Purge { path } => {
            let removed = store.delete_all(&path);
            println!(" Deleted {removed} snapshot(s) of {}", path.display());
        }
        SnapshotAction::Clear => {
            let removed = store.clear();
            println!(" Deleted {removed} snapshot(s)");
        }
    }

    Ok(())
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

/// Parse a size string (e.g., "1KB", "10MB", "1GB").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        other => bail!("Unknown size unit: {other}"),
    };
    let num: f64 = num
        .parse()
        .with_context(|| format!("Invalid size: {s}"))?;

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1").unwrap(), 1);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1.5k").unwrap(), 1536);
        assert_eq!(parse_size(" 2 MB ").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_size("12 parsecs").is_err());
        assert!(parse_size("KB").is_err());
    }

    #[test]
    fn test_truncate_and_bar() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("much-too-long", 5), "much…");
        assert_eq!(make_bar(0.5, 4), "[██░░]");
        assert_eq!(make_bar(2.0, 3), "[███]");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "lumidisk",
            "-vv",
            "duplicates",
            "/tmp",
            "--min-size",
            "4KB",
            "-x",
            "*.log",
            "-x",
            "target",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Duplicates { scan, min_size, .. } = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(min_size, "4KB");
        assert_eq!(scan.ignore, vec!["*.log", "target"]);
        assert_eq!(scan.path, PathBuf::from("/tmp"));
    }
}
