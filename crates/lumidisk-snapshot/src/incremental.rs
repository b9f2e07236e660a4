//! Incremental re-scanning against the latest snapshot.
//!
//! A re-scan walks the live tree comparing size and modification time with
//! the prior snapshot, re-stats only the paths that differ, and merges them
//! with the entries carried over unchanged. Content is never read: a file
//! rewritten in place with the same size inside one mtime tick goes unnoticed.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lumidisk_core::{FileEntry, Inventory, ScanConfig, ScanError, ScanWarning, Snapshot};
use lumidisk_scan::{
    JwalkScanner, Probe, WalkEvent, path_exists, probe_paths, resolve_root, walk_parallel,
};

use crate::store::SnapshotStore;

/// Paths that differ between a snapshot and the live tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Present now, absent from the snapshot.
    pub added: Vec<PathBuf>,
    /// Present in both with a different size, mtime or type.
    pub modified: Vec<PathBuf>,
    /// In the snapshot, gone from disk.
    pub removed: Vec<PathBuf>,
}

impl ChangeSet {
    /// True when the tree matches the snapshot.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Every changed path, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.removed)
            .map(PathBuf::as_path)
    }

    fn sort(&mut self) {
        self.added.sort();
        self.modified.sort();
        self.removed.sort();
    }
}

/// How an incremental scan produced its inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMode {
    /// No usable snapshot; the whole tree was walked.
    Full,
    /// Nothing changed; the snapshot's inventory was reused as is.
    Unchanged,
    /// Only the listed paths were re-examined.
    Rescanned(ChangeSet),
}

/// Result of [`IncrementalScanner::scan`].
#[derive(Debug)]
pub struct IncrementalScan {
    /// Up-to-date inventory of the root.
    pub inventory: Inventory,
    /// What work was needed to produce it.
    pub mode: ScanMode,
    /// Snapshot written for this result, if any.
    pub snapshot_path: Option<PathBuf>,
}

/// Metadata compared during change detection.
#[derive(Debug)]
struct Signature {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
    is_dir: bool,
}

impl Signature {
    fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let is_dir = metadata.is_dir();
        Self {
            path: path.to_path_buf(),
            size: if is_dir { 0 } else { metadata.len() },
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            is_dir,
        }
    }
}

/// Scanner that reuses the latest snapshot of a root when it can.
pub struct IncrementalScanner {
    scanner: JwalkScanner,
    store: SnapshotStore,
    cancel: CancellationToken,
}

impl IncrementalScanner {
    /// Create a scanner persisting to `store`.
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            scanner: JwalkScanner::new(),
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token for every phase.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.scanner = self.scanner.with_cancel_token(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// The underlying full scanner (for progress subscriptions).
    pub fn scanner(&self) -> &JwalkScanner {
        &self.scanner
    }

    /// The snapshot store.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Produce an up-to-date inventory of `config.root`, doing as little
    /// filesystem work as the latest snapshot allows.
    ///
    /// A new snapshot is written unless nothing changed.
    pub fn scan(&self, config: &ScanConfig) -> Result<IncrementalScan, ScanError> {
        let start = Instant::now();
        let root = resolve_root(&config.root)?;

        let Some(prior) = self.store.latest(&root) else {
            info!(root = %root.display(), "no usable snapshot, running full scan");
            return self.full_scan(config);
        };
        debug!(
            root = %root.display(),
            captured_at = %prior.captured_at,
            entries = prior.inventory.entries.len(),
            "comparing against snapshot"
        );

        let (changes, mut warnings) = self.detect_changes(config, &root, &prior.inventory)?;
        if changes.is_empty() {
            info!(
                root = %root.display(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "no changes since snapshot"
            );
            return Ok(IncrementalScan {
                inventory: prior.into_inventory(),
                mode: ScanMode::Unchanged,
                snapshot_path: None,
            });
        }

        info!(
            root = %root.display(),
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "rescanning changed paths"
        );

        let stale: Vec<PathBuf> = changes
            .added
            .iter()
            .chain(&changes.modified)
            .cloned()
            .collect();
        let (fresh, rescan_warnings) = probe_paths(&stale, config.follow_symlinks, &self.cancel);
        if self.cancel.is_cancelled() {
            return Err(ScanError::Interrupted);
        }
        warnings.extend(rescan_warnings);

        let mut inventory = merge(&root, prior.into_inventory(), &changes, fresh, start);
        inventory.warnings = warnings;

        let snapshot = Snapshot::new(&root, inventory);
        let snapshot_path = self.store.save(&snapshot);

        info!(
            root = %root.display(),
            files = snapshot.inventory.total_files(),
            bytes = snapshot.inventory.total_size(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "incremental scan finished"
        );

        Ok(IncrementalScan {
            inventory: snapshot.into_inventory(),
            mode: ScanMode::Rescanned(changes),
            snapshot_path,
        })
    }

    /// Walk the whole tree regardless of snapshots, then persist the result.
    pub fn full_scan(&self, config: &ScanConfig) -> Result<IncrementalScan, ScanError> {
        let root = resolve_root(&config.root)?;
        let inventory = self.scanner.scan(&config.with_root(&root))?;

        let snapshot = Snapshot::new(&root, inventory);
        let snapshot_path = self.store.save(&snapshot);

        Ok(IncrementalScan {
            inventory: snapshot.into_inventory(),
            mode: ScanMode::Full,
            snapshot_path,
        })
    }

    /// Classify live paths against the snapshot's recorded metadata.
    fn detect_changes(
        &self,
        config: &ScanConfig,
        root: &Path,
        prior: &Inventory,
    ) -> Result<(ChangeSet, Vec<ScanWarning>), ScanError> {
        let known = prior.by_path();
        let mut seen: HashSet<&Path> = HashSet::with_capacity(known.len());
        let mut changes = ChangeSet::default();
        let mut warnings = Vec::new();

        let probe: Probe<Signature> = Arc::new(Signature::from_metadata);
        walk_parallel(config, root, &self.cancel, probe, |event| match event {
            WalkEvent::Entry(sig) => match known.get_key_value(sig.path.as_path()) {
                None => changes.added.push(sig.path),
                Some((&path, entry)) => {
                    seen.insert(path);
                    if !entry.same_metadata(sig.size, sig.modified, sig.is_dir) {
                        changes.modified.push(sig.path);
                    }
                }
            },
            WalkEvent::Warning(warning) => warnings.push(warning),
        })?;

        // Unvisited paths that still exist (ignored now, or under an
        // unreadable directory) keep their recorded entry.
        let follow_symlinks = config.follow_symlinks;
        changes.removed = prior
            .entries
            .par_iter()
            .map(|entry| entry.path.as_path())
            .filter(|path| !seen.contains(path) && !path_exists(path, follow_symlinks))
            .map(Path::to_path_buf)
            .collect();

        changes.sort();
        Ok((changes, warnings))
    }
}

/// Replace changed entries of `prior` with `fresh` ones and recompute totals.
fn merge(
    root: &Path,
    prior: Inventory,
    changes: &ChangeSet,
    fresh: Vec<FileEntry>,
    start: Instant,
) -> Inventory {
    let changed: HashSet<&Path> = changes.paths().collect();

    let mut entries: Vec<FileEntry> = prior
        .entries
        .into_iter()
        .filter(|e| !changed.contains(e.path.as_path()))
        .collect();
    entries.extend(fresh);

    // Keep the root as the first entry even when it was re-examined.
    if let Some(pos) = entries.iter().position(|e| e.path == root) {
        entries[..=pos].rotate_right(1);
    }

    Inventory::from_entries(entries, start.elapsed())
}
