//! File and directory entry types.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// BLAKE3 content hash for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A single file or directory discovered by a scan.
///
/// Everything except the content hash is fixed at construction. The hash is
/// filled in at most once, by the duplicate finder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path.
    pub path: PathBuf,

    /// Size in bytes (0 for directories).
    pub size: u64,

    /// Last modification time as reported by the filesystem.
    #[serde(with = "mtime")]
    pub modified: SystemTime,

    /// Whether this entry is a directory.
    pub is_dir: bool,

    /// Whether this entry is hidden.
    pub is_hidden: bool,

    /// Lowercase extension, empty for directories and extensionless files.
    extension: CompactString,

    /// Content hash, set by duplicate detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_hash: Option<ContentHash>,
}

impl FileEntry {
    /// Create a regular file entry.
    pub fn file(path: impl Into<PathBuf>, size: u64, modified: SystemTime, is_hidden: bool) -> Self {
        let path = path.into();
        let extension = path
            .file_name()
            .map(|name| extension_of(&name.to_string_lossy()))
            .unwrap_or_default();

        Self {
            path,
            size,
            modified,
            is_dir: false,
            is_hidden,
            extension,
            content_hash: None,
        }
    }

    /// Create a directory entry.
    pub fn directory(path: impl Into<PathBuf>, modified: SystemTime, is_hidden: bool) -> Self {
        Self {
            path: path.into(),
            size: 0,
            modified,
            is_dir: true,
            is_hidden,
            extension: CompactString::default(),
            content_hash: None,
        }
    }

    /// Build an entry from already-fetched metadata.
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        let path = path.into();
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let hidden = is_hidden(&path, metadata);

        if metadata.is_dir() {
            Self::directory(path, modified, hidden)
        } else {
            Self::file(path, metadata.len(), modified, hidden)
        }
    }

    /// Lowercase extension (empty for directories).
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// File name component of the path.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Content hash, if duplicate detection has hashed this entry.
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.content_hash
    }

    /// Record the content hash.
    ///
    /// Returns `false` without touching the entry if a hash is already set.
    pub fn set_content_hash(&mut self, hash: ContentHash) -> bool {
        if self.content_hash.is_some() {
            return false;
        }
        self.content_hash = Some(hash);
        true
    }

    /// Whether size and modification time match the given metadata values.
    pub fn same_metadata(&self, size: u64, modified: SystemTime, is_dir: bool) -> bool {
        self.size == size && self.modified == modified && self.is_dir == is_dir
    }
}

/// Derive the lowercase extension from a file name.
///
/// Leading-dot names (`.bashrc`) and trailing dots (`notes.`) have no
/// extension.
pub fn extension_of(name: &str) -> CompactString {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => {
            CompactString::new(name[idx + 1..].to_lowercase())
        }
        _ => CompactString::default(),
    }
}

/// Modification times as signed seconds plus nanoseconds from the Unix epoch.
///
/// Pre-1970 mtimes are valid filesystem input, which serde's own
/// `SystemTime` encoding rejects.
mod mtime {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const NANOS_PER_SEC: u32 = 1_000_000_000;

    #[derive(Serialize, Deserialize)]
    struct EpochTime {
        secs: i64,
        nanos: u32,
    }

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => EpochTime {
                secs: i64::try_from(after.as_secs()).map_err(S::Error::custom)?,
                nanos: after.subsec_nanos(),
            },
            Err(err) => {
                let before = err.duration();
                let secs = i64::try_from(before.as_secs()).map_err(S::Error::custom)?;
                match before.subsec_nanos() {
                    0 => EpochTime { secs: -secs, nanos: 0 },
                    n => EpochTime {
                        secs: -secs - 1,
                        nanos: NANOS_PER_SEC - n,
                    },
                }
            }
        };
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let EpochTime { secs, nanos } = EpochTime::deserialize(deserializer)?;
        if nanos >= NANOS_PER_SEC {
            return Err(D::Error::custom(format!("nanosecond field out of range: {nanos}")));
        }

        let whole = Duration::from_secs(secs.unsigned_abs());
        let base = if secs >= 0 {
            UNIX_EPOCH.checked_add(whole)
        } else {
            UNIX_EPOCH.checked_sub(whole)
        };
        base.and_then(|t| t.checked_add(Duration::from_nanos(u64::from(nanos))))
            .ok_or_else(|| D::Error::custom("modification time out of range"))
    }
}

#[cfg(windows)]
fn is_hidden(_path: &Path, metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(windows))]
fn is_hidden(path: &Path, _metadata: &Metadata) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}
