//! JWalk-based parallel directory scanner.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumidisk_core::{FileEntry, Inventory, ScanConfig, ScanError, ScanWarning};

use crate::progress::ScanProgress;
use crate::stats::AtomicStats;
use crate::walk::{Probe, WalkEvent, walk_parallel};

/// Entries between progress broadcasts.
const PROGRESS_INTERVAL: u64 = 1000;

/// High-performance scanner using jwalk for parallel traversal.
pub struct JwalkScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
    cancel: CancellationToken,
}

impl JwalkScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            progress_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops scans started by this scanner.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Perform a scan of the configured root.
    ///
    /// Only an unusable root fails the scan; problems with individual
    /// entries end up in [`Inventory::warnings`].
    pub fn scan(&self, config: &ScanConfig) -> Result<Inventory, ScanError> {
        let start = Instant::now();
        let root_path = resolve_root(&config.root)?;
        info!(root = %root_path.display(), "scan started");

        let stats = Arc::new(AtomicStats::new());
        let probe: Probe<FileEntry> = {
            let stats = Arc::clone(&stats);
            Arc::new(move |path: &Path, metadata: &std::fs::Metadata| {
                let entry = FileEntry::from_metadata(path, metadata);
                stats.record(&entry);
                entry
            })
        };

        let mut entries = Vec::new();
        let mut warnings = Vec::new();
        walk_parallel(config, &root_path, &self.cancel, probe, |event| match event {
            WalkEvent::Entry(entry) => {
                if entries.len() as u64 % PROGRESS_INTERVAL == 0 {
                    self.report(&stats, &entry.path, warnings.len(), start, false);
                }
                entries.push(entry);
            }
            WalkEvent::Warning(warning) => {
                debug!(path = %warning.path.display(), message = %warning.message, "entry skipped");
                warnings.push(warning);
            }
        })?;

        dedup_warnings(&mut warnings);
        let scan_duration = start.elapsed();
        self.report(&stats, &root_path, warnings.len(), start, true);

        let inventory = Inventory::new(entries, stats.to_stats(), scan_duration, warnings);
        if inventory.has_warnings() {
            warn!(
                root = %root_path.display(),
                count = inventory.warnings.len(),
                "some entries could not be read"
            );
        }
        info!(
            root = %root_path.display(),
            files = inventory.total_files(),
            dirs = inventory.total_dirs(),
            bytes = inventory.total_size(),
            elapsed_ms = scan_duration.as_millis() as u64,
            "scan finished"
        );

        Ok(inventory)
    }

    fn report(
        &self,
        stats: &AtomicStats,
        current_path: &Path,
        errors: usize,
        start: Instant,
        finished: bool,
    ) {
        // No subscribers is not an error.
        let _ = self.progress_tx.send(ScanProgress {
            files_scanned: stats.files(),
            dirs_scanned: stats.dirs(),
            bytes_scanned: stats.bytes(),
            current_path: current_path.to_path_buf(),
            errors_count: errors as u64,
            elapsed: start.elapsed(),
            finished,
        });
    }
}

impl Default for JwalkScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonicalize the scan root and check that it is a readable directory.
pub fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let root_path = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
    let metadata = std::fs::metadata(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory { path: root_path });
    }
    std::fs::read_dir(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
    Ok(root_path)
}

/// A directory that fails to list can be reported twice by the walker.
fn dedup_warnings(warnings: &mut Vec<ScanWarning>) {
    let mut seen = std::collections::HashSet::new();
    warnings.retain(|w| seen.insert((w.path.clone(), w.kind)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumidisk_core::WarningKind;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.rs"), "test").unwrap();
        fs::write(root.join("dir2/file4"), "another file here").unwrap();

        temp
    }

    #[test]
    fn test_basic_scan() {
        let temp = create_test_tree();
        let inventory = JwalkScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

        assert_eq!(inventory.total_files(), 4);
        // dir1, dir2, subdir + the root itself
        assert_eq!(inventory.total_dirs(), 4);
        assert_eq!(inventory.total_size(), 5 + 17 + 4 + 17);
        assert_eq!(inventory.extension_sizes().get("txt"), Some(&22));
        assert_eq!(inventory.extension_sizes().get("rs"), Some(&4));
        assert!(!inventory.has_warnings());
    }

    #[test]
    fn test_root_is_first_entry() {
        let temp = create_test_tree();
        let inventory = JwalkScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

        let root = temp.path().canonicalize().unwrap();
        assert_eq!(inventory.entries[0].path, root);
        assert!(inventory.entries[0].is_dir);
    }

    #[test]
    fn test_missing_root_fails() {
        let temp = TempDir::new().unwrap();
        let result = JwalkScanner::new().scan(&ScanConfig::new(temp.path().join("nope")));
        assert!(matches!(result, Err(ScanError::NotFound { .. })));
    }

    #[test]
    fn test_file_root_fails() {
        let temp = create_test_tree();
        let result = JwalkScanner::new().scan(&ScanConfig::new(temp.path().join("file1.txt")));
        assert!(matches!(result, Err(ScanError::NotADirectory { .. })));
    }

    #[test]
    fn test_exclude_hidden() {
        let temp = create_test_tree();
        fs::write(temp.path().join(".secret"), "xx").unwrap();

        let config = ScanConfig::builder()
            .root(temp.path())
            .include_hidden(false)
            .build()
            .unwrap();
        let inventory = JwalkScanner::new().scan(&config).unwrap();

        assert_eq!(inventory.total_files(), 4);
        assert!(!inventory.entries.iter().any(|e| e.name() == ".secret"));
    }

    #[test]
    fn test_max_depth() {
        let temp = create_test_tree();
        let config = ScanConfig::builder()
            .root(temp.path())
            .max_depth(1u32)
            .build()
            .unwrap();
        let inventory = JwalkScanner::new().scan(&config).unwrap();

        // root, dir1, dir2, file1.txt
        assert_eq!(inventory.entries.len(), 4);
    }

    #[test]
    fn test_cancelled_scan() {
        let temp = create_test_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let scanner = JwalkScanner::new().with_cancel_token(cancel);
        let result = scanner.scan(&ScanConfig::new(temp.path()));
        assert!(matches!(result, Err(ScanError::Interrupted)));
    }

    #[test]
    fn test_progress_final_update() {
        let temp = create_test_tree();
        let scanner = JwalkScanner::new();
        let mut rx = scanner.subscribe();

        scanner.scan(&ScanConfig::new(temp.path())).unwrap();

        let mut last = None;
        while let Ok(progress) = rx.try_recv() {
            last = Some(progress);
        }
        let last = last.unwrap();
        assert!(last.finished);
        assert_eq!(last.files_scanned, 4);
    }

    #[test]
    fn test_dedup_warnings_keeps_first_per_path_and_kind() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let broken = std::io::Error::other("bad sector");
        let mut warnings = vec![
            ScanWarning::read_error("/r/locked", &denied),
            ScanWarning::read_error("/r/disk", &broken),
            ScanWarning::read_error("/r/locked", &denied),
            ScanWarning::metadata("/r/disk", &broken),
            ScanWarning::read_error("/r/disk", &broken),
        ];

        dedup_warnings(&mut warnings);

        let kept: Vec<_> = warnings.iter().map(|w| (w.path.to_str().unwrap(), w.kind)).collect();
        assert_eq!(
            kept,
            vec![
                ("/r/locked", WarningKind::PermissionDenied),
                ("/r/disk", WarningKind::ReadError),
                ("/r/disk", WarningKind::MetadataError),
            ]
        );
    }
}
