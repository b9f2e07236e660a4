//! Lock-free aggregate accumulation shared by scan workers.

use std::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;
use dashmap::DashMap;

use lumidisk_core::{FileEntry, InventoryStats};

/// Aggregates updated concurrently while entries are discovered.
#[derive(Debug, Default)]
pub struct AtomicStats {
    total_size: AtomicU64,
    total_files: AtomicU64,
    total_dirs: AtomicU64,
    extension_sizes: DashMap<CompactString, u64>,
}

impl AtomicStats {
    /// Create empty accumulators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one discovered entry.
    pub fn record(&self, entry: &FileEntry) {
        if entry.is_dir {
            self.total_dirs.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.total_files.fetch_add(1, Ordering::Relaxed);
        self.total_size.fetch_add(entry.size, Ordering::Relaxed);

        let ext = entry.extension();
        if !ext.is_empty() {
            *self
                .extension_sizes
                .entry(CompactString::new(ext))
                .or_insert(0) += entry.size;
        }
    }

    /// Files seen so far.
    pub fn files(&self) -> u64 {
        self.total_files.load(Ordering::Relaxed)
    }

    /// Directories seen so far.
    pub fn dirs(&self) -> u64 {
        self.total_dirs.load(Ordering::Relaxed)
    }

    /// Bytes seen so far.
    pub fn bytes(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    /// Read the final values. Call only after every worker has finished.
    pub fn to_stats(&self) -> InventoryStats {
        InventoryStats {
            total_size: self.bytes(),
            total_files: self.files(),
            total_dirs: self.dirs(),
            extension_sizes: self
                .extension_sizes
                .iter()
                .map(|item| (item.key().to_string(), *item.value()))
                .collect(),
        }
    }
}
