//! Analysis algorithms for lumidisk.
//!
//! # Duplicate Detection
//!
//! Finds byte-identical files in an inventory:
//!
//! 1. Group files by size (instant)
//! 2. Compute a full BLAKE3 hash for every file that shares its size
//! 3. Group by hash; every group of two or more is a duplicate set
//!
//! ```rust,ignore
//! use lumidisk_analyze::DuplicateFinder;
//! use lumidisk_scan::{JwalkScanner, ScanConfig};
//!
//! let scan_config = ScanConfig::new("/path/to/scan");
//! let mut inventory = JwalkScanner::new().scan(&scan_config).unwrap();
//!
//! let finder = DuplicateFinder::new();
//! let report = finder.find_in_inventory(&mut inventory);
//!
//! println!("Found {} duplicate groups", report.groups.len());
//! println!("Wasted space: {} bytes", report.total_wasted_space);
//! ```

mod duplicates;

pub use duplicates::{
    DuplicateConfig, DuplicateConfigBuilder, DuplicateFinder, DuplicateGroup, DuplicateReport,
    hash_file,
};

// Re-export core types
pub use lumidisk_core::{ContentHash, FileEntry, Inventory};
