//! Inventory container and aggregate statistics.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entry::FileEntry;
use crate::error::ScanWarning;

/// Aggregates over the entries of an inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    /// Sum of sizes of non-directory entries.
    pub total_size: u64,
    /// Number of non-directory entries.
    pub total_files: u64,
    /// Number of directory entries.
    pub total_dirs: u64,
    /// Cumulative size per non-empty extension.
    pub extension_sizes: BTreeMap<String, u64>,
}

impl InventoryStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute stats over a set of entries.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a FileEntry>) -> Self {
        let mut stats = Self::new();
        for entry in entries {
            stats.record(entry);
        }
        stats
    }

    /// Update stats with one entry.
    pub fn record(&mut self, entry: &FileEntry) {
        if entry.is_dir {
            self.total_dirs += 1;
            return;
        }

        self.total_files += 1;
        self.total_size += entry.size;

        let ext = entry.extension();
        if !ext.is_empty() {
            *self.extension_sizes.entry(ext.to_string()).or_default() += entry.size;
        }
    }

    /// Fold another set of stats into this one.
    pub fn merge(&mut self, other: InventoryStats) {
        self.total_size += other.total_size;
        self.total_files += other.total_files;
        self.total_dirs += other.total_dirs;
        for (ext, size) in other.extension_sizes {
            *self.extension_sizes.entry(ext).or_default() += size;
        }
    }
}

/// Result of one scan pass: every discovered entry plus its aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    /// Entries in discovery order.
    pub entries: Vec<FileEntry>,

    /// Aggregate statistics.
    pub stats: InventoryStats,

    /// Wall-clock duration of the scan.
    pub scan_duration: Duration,

    /// Entries that could not be examined.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl Inventory {
    /// Assemble an inventory from entries and stats accumulated during a walk.
    pub fn new(
        entries: Vec<FileEntry>,
        stats: InventoryStats,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        Self {
            entries,
            stats,
            scan_duration,
            warnings,
        }
    }

    /// Build an inventory, computing all aggregates from the entries.
    pub fn from_entries(entries: Vec<FileEntry>, scan_duration: Duration) -> Self {
        let stats = InventoryStats::from_entries(&entries);
        Self::new(entries, stats, scan_duration, Vec::new())
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.stats.total_size
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Get the total number of directories.
    pub fn total_dirs(&self) -> u64 {
        self.stats.total_dirs
    }

    /// Cumulative size per extension.
    pub fn extension_sizes(&self) -> &BTreeMap<String, u64> {
        &self.stats.extension_sizes
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Recompute aggregates from the entries, ignoring the stored stats.
    pub fn recompute_stats(&self) -> InventoryStats {
        InventoryStats::from_entries(&self.entries)
    }

    /// Index entries by path.
    pub fn by_path(&self) -> HashMap<&Path, &FileEntry> {
        self.entries.iter().map(|e| (e.path.as_path(), e)).collect()
    }

    /// Extensions with the largest cumulative size, largest first.
    pub fn top_extensions(&self, n: usize) -> Vec<(&str, u64)> {
        let mut exts: Vec<(&str, u64)> = self
            .stats
            .extension_sizes
            .iter()
            .map(|(ext, size)| (ext.as_str(), *size))
            .collect();
        exts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        exts.truncate(n);
        exts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn sample_entries() -> Vec<FileEntry> {
        let now = SystemTime::now();
        vec![
            FileEntry::directory("/root", now, false),
            FileEntry::file("/root/a.txt", 100, now, false),
            FileEntry::file("/root/b.TXT", 50, now, false),
            FileEntry::file("/root/Makefile", 7, now, false),
            FileEntry::directory("/root/sub", now, false),
            FileEntry::file("/root/sub/c.rs", 30, now, false),
        ]
    }

    #[test]
    fn test_stats_default() {
        let stats = InventoryStats::default();
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.total_dirs, 0);
        assert!(stats.extension_sizes.is_empty());
    }

    #[test]
    fn test_from_entries_aggregates() {
        let inventory = Inventory::from_entries(sample_entries(), Duration::ZERO);

        assert_eq!(inventory.total_files(), 4);
        assert_eq!(inventory.total_dirs(), 2);
        assert_eq!(inventory.total_size(), 187);
        assert_eq!(inventory.extension_sizes().get("txt"), Some(&150));
        assert_eq!(inventory.extension_sizes().get("rs"), Some(&30));
        assert!(!inventory.extension_sizes().contains_key(""));
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let entries = sample_entries();
        let (left, right) = entries.split_at(3);

        let mut merged = InventoryStats::from_entries(left);
        merged.merge(InventoryStats::from_entries(right));

        assert_eq!(merged, InventoryStats::from_entries(&entries));
    }

    #[test]
    fn test_top_extensions() {
        let inventory = Inventory::from_entries(sample_entries(), Duration::ZERO);
        let top = inventory.top_extensions(1);
        assert_eq!(top, vec![("txt", 150)]);
    }
}
