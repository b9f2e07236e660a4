//! Snapshot persistence and incremental scanning for lumidisk.
//!
//! [`SnapshotStore`] keeps a bounded history of inventories on disk, keyed by
//! root. [`IncrementalScanner`] uses the latest of them to avoid re-examining
//! paths whose size and modification time have not moved.
//!
//! ```rust,no_run
//! use lumidisk_snapshot::{IncrementalScanner, ScanMode, SnapshotStore};
//! use lumidisk_core::ScanConfig;
//!
//! let store = SnapshotStore::open_default().unwrap();
//! let scanner = IncrementalScanner::new(store);
//! let result = scanner.scan(&ScanConfig::new("/path/to/scan")).unwrap();
//!
//! if let ScanMode::Rescanned(changes) = &result.mode {
//!     println!("{} paths changed", changes.len());
//! }
//! println!("Total size: {} bytes", result.inventory.total_size());
//! ```

mod incremental;
mod store;

pub use incremental::{ChangeSet, IncrementalScan, IncrementalScanner, ScanMode};
pub use store::{
    DEFAULT_MAX_SNAPSHOTS, SnapshotError, SnapshotStore, fingerprint, normalize_root,
    snapshot_file_name,
};

pub use lumidisk_core::{SNAPSHOT_FORMAT_VERSION, Snapshot};
