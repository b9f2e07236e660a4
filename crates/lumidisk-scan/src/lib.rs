//! File system scanning engine for lumidisk.
//!
//! This crate walks a directory tree in parallel and produces an
//! [`Inventory`]: a flat list of entries plus size, count and
//! per-extension aggregates.
//!
//! # Overview
//!
//! - **Parallel traversal** via jwalk/rayon, with `stat` calls made on the
//!   worker threads
//! - **Lock-free aggregates** accumulated while entries are discovered
//! - **Progress updates** via broadcast channels
//! - **Cooperative cancellation** through a shared `CancellationToken`
//! - **Partial results**: unreadable entries become warnings, never errors
//!
//! # Example
//!
//! ```rust,no_run
//! use lumidisk_scan::{JwalkScanner, ScanConfig};
//!
//! let config = ScanConfig::new("/path/to/scan");
//! let scanner = JwalkScanner::new();
//! let inventory = scanner.scan(&config).unwrap();
//!
//! println!("Total size: {} bytes", inventory.total_size());
//! println!("Total files: {}", inventory.total_files());
//! ```

mod progress;
mod scanner;
mod stats;
mod walk;

pub use progress::ScanProgress;
pub use scanner::{JwalkScanner, resolve_root};
pub use stats::AtomicStats;
pub use walk::{Probe, WalkEvent, path_exists, probe_path, probe_paths, walk_parallel};

// Re-export core types for convenience
pub use lumidisk_core::{
    FileEntry, Inventory, InventoryStats, ScanConfig, ScanError, ScanWarning, WarningKind,
};
pub use tokio_util::sync::CancellationToken;
