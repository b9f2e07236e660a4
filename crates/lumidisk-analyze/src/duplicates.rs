//! Duplicate file detection using content hashing.
//!
//! Uses a two-phase algorithm:
//! 1. Group files by exact size (instant, O(n)); unique sizes are dropped
//! 2. Stream every remaining candidate through BLAKE3 and group by hash
//!
//! Hashing splits the candidate list recursively with `rayon::join` until a
//! partition is small enough to process sequentially.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Instant;

use blake3::Hasher;
use derive_builder::Builder;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumidisk_core::{ContentHash, FileEntry, Inventory, ScanWarning};

/// Configuration for duplicate detection.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct DuplicateConfig {
    /// Minimum file size to consider.
    #[builder(default = "1")]
    pub min_size: u64,

    /// Maximum file size to consider.
    #[builder(default = "u64::MAX")]
    pub max_size: u64,

    /// Worker threads for hashing (0 = rayon's global pool).
    #[builder(default = "0")]
    pub threads: usize,

    /// Partitions at or below this many files are hashed sequentially.
    #[builder(default = "10")]
    pub parallel_threshold: usize,

    /// Read buffer size used while streaming file content.
    #[builder(default = "64 * 1024")]
    pub chunk_size: usize,

    /// Maximum number of groups to return (0 = unlimited).
    #[builder(default = "0")]
    pub max_groups: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: u64::MAX,
            threads: 0,
            parallel_threshold: 10,
            chunk_size: 64 * 1024,
            max_groups: 0,
        }
    }
}

impl DuplicateConfig {
    /// Create a new config builder.
    pub fn builder() -> DuplicateConfigBuilder {
        DuplicateConfigBuilder::default()
    }
}

/// A group of byte-identical files.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup<'a> {
    /// Content hash shared by all files in this group.
    pub hash: ContentHash,

    /// Size of each file in bytes.
    pub size: u64,

    /// Extension of the first member.
    pub extension: String,

    /// Member entries, in inventory order.
    pub members: Vec<&'a FileEntry>,

    /// Wasted space: size * (count - 1).
    pub wasted_bytes: u64,
}

impl<'a> DuplicateGroup<'a> {
    fn new(hash: ContentHash, members: Vec<&'a FileEntry>) -> Self {
        let size = members[0].size;
        let extension = members[0].extension().to_string();
        let wasted_bytes = size * (members.len() as u64 - 1);
        Self {
            hash,
            size,
            extension,
            members,
            wasted_bytes,
        }
    }

    /// Get the number of duplicate files.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Paths of all members.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.members.iter().map(|e| e.path.as_path())
    }
}

/// Results from duplicate analysis.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport<'a> {
    /// Groups sorted by wasted space, then size (both descending), then hash.
    pub groups: Vec<DuplicateGroup<'a>>,

    /// Total wasted space across all groups.
    pub total_wasted_space: u64,

    /// Number of files eligible for comparison.
    pub files_analyzed: u64,

    /// Number of files that shared a size with another file.
    pub candidates_hashed: u64,

    /// Files that could not be read while hashing.
    pub warnings: Vec<ScanWarning>,

    /// Whether hashing stopped early because of cancellation.
    pub interrupted: bool,
}

impl DuplicateReport<'_> {
    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Get total number of duplicate files across all groups.
    pub fn total_duplicate_files(&self) -> usize {
        self.groups.iter().map(|g| g.count()).sum()
    }
}

/// Duplicate file finder.
pub struct DuplicateFinder {
    config: DuplicateConfig,
    cancel: CancellationToken,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with default config.
    pub fn new() -> Self {
        Self::with_config(DuplicateConfig::default())
    }

    /// Create a new duplicate finder with custom config.
    pub fn with_config(config: DuplicateConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Find duplicates among the entries of an inventory.
    pub fn find_in_inventory<'a>(&self, inventory: &'a mut Inventory) -> DuplicateReport<'a> {
        self.find_duplicates(&mut inventory.entries)
    }

    /// Find duplicates among `entries`, recording content hashes on them.
    ///
    /// Entries that already carry a hash are grouped without being read again.
    pub fn find_duplicates<'a>(&self, entries: &'a mut [FileEntry]) -> DuplicateReport<'a> {
        let start = Instant::now();

        // Phase 1: bucket by size, keep only shared sizes
        let (files_analyzed, candidate_idx) = self.size_candidates(entries);
        info!(
            files = files_analyzed,
            candidates = candidate_idx.len(),
            "duplicate detection started"
        );

        // Phase 2: hash every candidate
        let warnings = {
            let mut is_candidate = vec![false; entries.len()];
            for &i in &candidate_idx {
                is_candidate[i] = true;
            }
            let mut candidates: Vec<&mut FileEntry> = entries
                .iter_mut()
                .zip(is_candidate)
                .filter_map(|(entry, keep)| keep.then_some(entry))
                .collect();
            self.hash_all(&mut candidates)
        };
        let interrupted = self.cancel.is_cancelled();

        // Phase 3: group by hash
        let entries: &'a [FileEntry] = entries;
        let mut by_hash: HashMap<ContentHash, Vec<&'a FileEntry>> = HashMap::new();
        for &i in &candidate_idx {
            let entry = &entries[i];
            if let Some(hash) = entry.content_hash() {
                by_hash.entry(hash).or_default().push(entry);
            }
        }

        let mut groups: Vec<DuplicateGroup<'a>> = by_hash
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(hash, members)| DuplicateGroup::new(hash, members))
            .collect();

        groups.sort_by(|a, b| {
            b.wasted_bytes
                .cmp(&a.wasted_bytes)
                .then_with(|| b.size.cmp(&a.size))
                .then_with(|| a.hash.cmp(&b.hash))
        });

        if self.config.max_groups > 0 && groups.len() > self.config.max_groups {
            groups.truncate(self.config.max_groups);
        }

        let total_wasted_space = groups.iter().map(|g| g.wasted_bytes).sum();

        info!(
            groups = groups.len(),
            wasted_bytes = total_wasted_space,
            failures = warnings.len(),
            interrupted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "duplicate detection finished"
        );

        DuplicateReport {
            groups,
            total_wasted_space,
            files_analyzed,
            candidates_hashed: candidate_idx.len() as u64,
            warnings,
            interrupted,
        }
    }

    /// Indices of files whose size is shared with at least one other file.
    fn size_candidates(&self, entries: &[FileEntry]) -> (u64, Vec<usize>) {
        let mut by_size: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut analyzed = 0u64;

        for (i, entry) in entries.iter().enumerate() {
            if entry.is_dir || entry.size == 0 {
                continue;
            }
            if entry.size < self.config.min_size || entry.size > self.config.max_size {
                continue;
            }
            analyzed += 1;
            by_size.entry(entry.size).or_default().push(i);
        }

        let mut candidates: Vec<usize> = by_size
            .into_values()
            .filter(|bucket| bucket.len() > 1)
            .flatten()
            .collect();
        candidates.sort_unstable();

        debug!(analyzed, candidates = candidates.len(), "size buckets built");
        (analyzed, candidates)
    }

    fn hash_all(&self, candidates: &mut [&mut FileEntry]) -> Vec<ScanWarning> {
        if self.config.threads == 0 {
            return self.hash_partition(candidates);
        }

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
        {
            Ok(pool) => pool.install(|| self.hash_partition(candidates)),
            Err(err) => {
                warn!(error = %err, "failed to build hashing pool, using the global pool");
                self.hash_partition(candidates)
            }
        }
    }

    fn hash_partition(&self, part: &mut [&mut FileEntry]) -> Vec<ScanWarning> {
        if part.len() <= self.config.parallel_threshold.max(1) {
            return part
                .iter_mut()
                .filter_map(|entry| self.hash_entry(entry))
                .collect();
        }

        let mid = part.len() / 2;
        let (left, right) = part.split_at_mut(mid);
        let (mut warnings, right_warnings) =
            rayon::join(|| self.hash_partition(left), || self.hash_partition(right));
        warnings.extend(right_warnings);
        warnings
    }

    fn hash_entry(&self, entry: &mut FileEntry) -> Option<ScanWarning> {
        if self.cancel.is_cancelled() || entry.content_hash().is_some() {
            return None;
        }

        match hash_file(&entry.path, self.config.chunk_size) {
            Ok(hash) => {
                entry.set_content_hash(hash);
                None
            }
            Err(err) => {
                warn!(path = %entry.path.display(), error = %err, "could not hash file");
                Some(ScanWarning::hash_error(&entry.path, &err))
            }
        }
    }
}

impl Default for DuplicateFinder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream a file through BLAKE3 in `chunk_size` reads.
pub fn hash_file(path: &Path, chunk_size: usize) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}
