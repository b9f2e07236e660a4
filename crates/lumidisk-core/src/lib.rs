//! Core types for lumidisk.
//!
//! This crate provides the data model shared by the scanner, the duplicate
//! finder and the snapshot store: file entries, inventories with their
//! aggregates, persisted snapshots, and scan configuration.

mod config;
mod entry;
mod error;
mod inventory;
mod snapshot;

pub use config::{ScanConfig, ScanConfigBuilder};
pub use entry::{ContentHash, FileEntry, extension_of};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use inventory::{Inventory, InventoryStats};
pub use snapshot::{SNAPSHOT_FORMAT_VERSION, Snapshot};
