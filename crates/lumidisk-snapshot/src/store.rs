//! On-disk snapshot store.
//!
//! One JSON file per snapshot, named `<fingerprint>_<capture time>.snapshot.json`
//! where the fingerprint identifies the normalized root path. All snapshots
//! live in a single flat directory and share one retention limit.
//!
//! Every public operation is best effort: failures are logged and reported as
//! "nothing found" / "nothing written", since callers can always fall back to a
//! full scan.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use lumidisk_core::{SNAPSHOT_FORMAT_VERSION, Snapshot};

/// Snapshots kept across all roots before the oldest are evicted.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 10;

const SNAPSHOT_SUFFIX: &str = ".snapshot.json";
const FINGERPRINT_LEN: usize = 16;
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";

/// Errors raised while reading or writing snapshot files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem failure on a snapshot file or the store directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The snapshot could not be encoded.
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The file is not a readable snapshot record.
    #[error("Corrupt snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The record was written by an unknown format version.
    #[error("Incompatible snapshot version {found:?} (expected {expected:?})")]
    IncompatibleVersion { found: String, expected: String },

    /// No per-user data directory exists on this platform.
    #[error("No local data directory available")]
    NoDataDir,
}

impl SnapshotError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Just enough of a record to check its version before a full parse.
#[derive(Deserialize)]
struct VersionProbe {
    version: String,
}

/// Directory of persisted snapshots with bounded retention.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    max_snapshots: usize,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Open a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            write_lock: Mutex::new(()),
        }
    }

    /// Open the per-user store under the platform's local data directory.
    pub fn open_default() -> Result<Self, SnapshotError> {
        Self::default_dir().map(Self::new).ok_or(SnapshotError::NoDataDir)
    }

    /// `<data_local_dir>/lumidisk/snapshots`, if the platform has one.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("lumidisk").join("snapshots"))
    }

    /// Set the retention limit. Zero is treated as one.
    pub fn with_max_snapshots(mut self, max_snapshots: usize) -> Self {
        self.max_snapshots = max_snapshots.max(1);
        self
    }

    /// Store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retention limit.
    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    /// Persist a snapshot, then enforce retention.
    ///
    /// Returns the written file, or `None` if the write failed.
    pub fn save(&self, snapshot: &Snapshot) -> Option<PathBuf> {
        let _guard = self.write_lock.lock();

        match self.write(snapshot) {
            Ok(path) => {
                info!(
                    path = %path.display(),
                    entries = snapshot.inventory.entries.len(),
                    "snapshot saved"
                );
                self.enforce_retention();
                Some(path)
            }
            Err(err) => {
                warn!(root = %snapshot.root_path.display(), error = %err, "failed to save snapshot");
                None
            }
        }
    }

    fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;

        let path = self.path_for(&snapshot.root_path, snapshot.captured_at);
        let bytes = serde_json::to_vec(snapshot).map_err(SnapshotError::Serialize)?;

        // Write to a sibling temp file and rename so readers never see a torn record.
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| SnapshotError::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| SnapshotError::io(&path, e.error))?;

        Ok(path)
    }

    /// Most recent readable snapshot for `root`.
    ///
    /// Corrupt or incompatible files are skipped in favor of older ones.
    pub fn latest(&self, root: &Path) -> Option<Snapshot> {
        let root = normalize_root(root);
        self.files_for(&root)
            .into_iter()
            .rev()
            .find_map(|path| self.load_for(&path, &root))
    }

    /// All readable snapshots for `root`, oldest capture first.
    pub fn snapshots(&self, root: &Path) -> Vec<Snapshot> {
        let root = normalize_root(root);
        let mut snapshots: Vec<Snapshot> = self
            .files_for(&root)
            .into_iter()
            .filter_map(|path| self.load_for(&path, &root))
            .collect();
        snapshots.sort_by_key(|s| s.captured_at);
        snapshots
    }

    /// Delete one snapshot. Returns whether a file was removed.
    pub fn delete_snapshot(&self, snapshot: &Snapshot) -> bool {
        let path = self.path_for(&snapshot.root_path, snapshot.captured_at);
        remove_logged(&path)
    }

    /// Delete every snapshot of `root`. Returns the number removed.
    pub fn delete_all(&self, root: &Path) -> usize {
        let root = normalize_root(root);
        let removed = self
            .files_for(&root)
            .iter()
            .filter(|path| remove_logged(path))
            .count();
        debug!(root = %root.display(), removed, "snapshots deleted");
        removed
    }

    /// Delete every snapshot in the store. Returns the number removed.
    pub fn clear(&self) -> usize {
        let _guard = self.write_lock.lock();
        self.all_files()
            .iter()
            .filter(|(path, _)| remove_logged(path))
            .count()
    }

    /// Number of snapshot files in the store.
    pub fn len(&self) -> usize {
        self.all_files().len()
    }

    /// Whether the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes used by snapshot files.
    pub fn cache_size(&self) -> u64 {
        self.all_files()
            .iter()
            .filter_map(|(path, _)| fs::metadata(path).ok())
            .map(|m| m.len())
            .sum()
    }

    /// Read and validate a single snapshot file.
    pub fn load_file(path: &Path) -> Result<Snapshot, SnapshotError> {
        let bytes = fs::read(path).map_err(|e| SnapshotError::io(path, e))?;

        let probe: VersionProbe = serde_json::from_slice(&bytes).map_err(|source| {
            SnapshotError::Corrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if probe.version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::IncompatibleVersion {
                found: probe.version,
                expected: SNAPSHOT_FORMAT_VERSION.to_string(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it was recorded for the already normalized `root`.
    fn load_for(&self, path: &Path, root: &Path) -> Option<Snapshot> {
        match Self::load_file(path) {
            // File names key on the normalized root, so compare the same form.
            Ok(snapshot) if normalize_root(&snapshot.root_path) == root => Some(snapshot),
            Ok(snapshot) => {
                debug!(
                    path = %path.display(),
                    recorded = %snapshot.root_path.display(),
                    "fingerprint collision, ignoring snapshot"
                );
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable snapshot");
                None
            }
        }
    }

    fn path_for(&self, root: &Path, captured_at: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(snapshot_file_name(&fingerprint(root), captured_at))
    }

    /// Snapshot files of one root, sorted by capture time.
    fn files_for(&self, root: &Path) -> Vec<PathBuf> {
        let prefix = format!("{}_", fingerprint(root));
        let mut files: Vec<PathBuf> = self
            .all_files()
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| file_name_str(path).is_some_and(|name| name.starts_with(&prefix)))
            .collect();
        // The timestamp is fixed width, so name order is capture order.
        files.sort();
        files
    }

    /// Every snapshot file in the store with its modification time.
    fn all_files(&self) -> Vec<(PathBuf, SystemTime)> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "cannot list snapshot store");
                return Vec::new();
            }
        };

        read_dir
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.ends_with(SNAPSHOT_SUFFIX))
            })
            .map(|entry| {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(UNIX_EPOCH);
                (entry.path(), modified)
            })
            .collect()
    }

    /// Evict the oldest files by write time until the limit holds.
    fn enforce_retention(&self) {
        let mut files = self.all_files();
        if files.len() <= self.max_snapshots {
            return;
        }

        files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let excess = files.len() - self.max_snapshots;
        for (path, _) in files.iter().take(excess) {
            if remove_logged(path) {
                info!(path = %path.display(), "evicted old snapshot");
            }
        }
    }
}

/// Canonical form of a root path used for keying snapshots.
///
/// Falls back to a lexically cleaned path when the root cannot be resolved.
pub fn normalize_root(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| {
        root.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    })
}

/// Stable identifier of a root: the first 16 hex digits of the BLAKE3 hash
/// of its normalized path.
pub fn fingerprint(root: &Path) -> String {
    let normalized = normalize_root(root);
    let hash = blake3::hash(normalized.to_string_lossy().as_bytes());
    hash.to_hex().as_str()[..FINGERPRINT_LEN].to_string()
}

/// File name of the snapshot of a root (by fingerprint) taken at `captured_at`.
pub fn snapshot_file_name(fingerprint: &str, captured_at: DateTime<Utc>) -> String {
    format!(
        "{fingerprint}_{}{SNAPSHOT_SUFFIX}",
        captured_at.format(TIMESTAMP_FORMAT)
    )
}

fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn remove_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to delete snapshot");
            false
        }
    }
}
