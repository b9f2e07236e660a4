//! Shared parallel walk over a directory tree.
//!
//! Directory listings and per-entry `stat` calls run on rayon workers inside
//! jwalk's `process_read_dir` callback. Each child carries the result of a
//! caller-supplied probe in its client state, so the consuming thread only
//! collects finished values.

use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use globset::GlobSet;
use jwalk::{DirEntry, Parallelism, WalkDirGeneric};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lumidisk_core::{FileEntry, ScanConfig, ScanError, ScanWarning};

/// How often the consuming thread checks for cancellation.
const CANCEL_CHECK_INTERVAL: usize = 256;

/// Turns an entry's metadata into the value collected by the walk.
pub type Probe<T> = Arc<dyn Fn(&Path, &Metadata) -> T + Send + Sync>;

/// One item produced by [`walk_parallel`].
#[derive(Debug)]
pub enum WalkEvent<T> {
    /// A probed entry.
    Entry(T),
    /// An entry that could not be examined.
    Warning(ScanWarning),
}

/// Per-entry client state: the probe result, filled in on a worker thread.
#[derive(Debug)]
struct Probed<T>(Option<Result<T, ScanWarning>>);

impl<T> Default for Probed<T> {
    fn default() -> Self {
        Self(None)
    }
}

type Walker<T> = WalkDirGeneric<((), Probed<T>)>;

/// Walk `root` in parallel, handing every probed entry to `visit`.
///
/// The root itself is produced first, then its descendants in pre-order.
/// Unreadable entries become [`WalkEvent::Warning`]s and never stop the walk.
/// Returns [`ScanError::Interrupted`] if `cancel` fires before the walk ends.
pub fn walk_parallel<T>(
    config: &ScanConfig,
    root: &Path,
    cancel: &CancellationToken,
    probe: Probe<T>,
    mut visit: impl FnMut(WalkEvent<T>),
) -> Result<(), ScanError>
where
    T: Send + fmt::Debug + 'static,
{
    let walker = build_walker(config, root, cancel, Arc::clone(&probe))?;

    for (seen, item) in walker.into_iter().enumerate() {
        if seen % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            debug!(root = %root.display(), "walk cancelled");
            return Err(ScanError::Interrupted);
        }

        let mut entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                visit(WalkEvent::Warning(warning_from_walk_error(&err)));
                continue;
            }
        };

        if let Some(err) = entry.read_children_error.take() {
            visit(WalkEvent::Warning(warning_from_walk_error(&err)));
        }

        let event = match entry.client_state.0.take() {
            Some(Ok(value)) => WalkEvent::Entry(value),
            Some(Err(warning)) => WalkEvent::Warning(warning),
            // Entries not seen by a worker (the root) are probed here.
            None => probe_entry(&entry, &probe)
                .map(WalkEvent::Entry)
                .unwrap_or_else(WalkEvent::Warning),
        };
        visit(event);
    }

    if cancel.is_cancelled() {
        return Err(ScanError::Interrupted);
    }
    Ok(())
}

fn build_walker<T>(
    config: &ScanConfig,
    root: &Path,
    cancel: &CancellationToken,
    probe: Probe<T>,
) -> Result<Walker<T>, ScanError>
where
    T: Send + fmt::Debug + 'static,
{
    let ignore = config.ignore_matcher()?;
    let follow_symlinks = config.follow_symlinks;
    let cancel = cancel.clone();

    let parallelism = match config.threads {
        0 => Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_millis(100),
        },
        n => Parallelism::RayonNewPool(n),
    };

    Ok(Walker::<T>::new(root)
        .parallelism(parallelism)
        .skip_hidden(!config.include_hidden)
        .follow_links(follow_symlinks)
        .min_depth(0)
        .max_depth(config.max_depth.map_or(usize::MAX, |d| d as usize))
        .process_read_dir(move |depth, _parent, _state, children| {
            // Dropping the children stops jwalk from descending any further.
            if cancel.is_cancelled() {
                children.clear();
                return;
            }

            // `depth` is None only for the synthetic listing holding the root.
            if depth.is_some() {
                children.retain(|child| match child {
                    Ok(entry) => keep_entry(entry, &ignore, follow_symlinks),
                    Err(_) => true,
                });
            }

            for child in children.iter_mut().flatten() {
                child.client_state = Probed(Some(probe_entry(child, &probe)));
            }
        }))
}

fn keep_entry<T>(entry: &DirEntry<((), Probed<T>)>, ignore: &GlobSet, follow_symlinks: bool) -> bool
where
    T: Send + fmt::Debug + 'static,
{
    if entry.file_type().is_symlink() && !follow_symlinks {
        return false;
    }
    !ignore.is_match(Path::new(entry.file_name()))
}

fn probe_entry<T>(entry: &DirEntry<((), Probed<T>)>, probe: &Probe<T>) -> Result<T, ScanWarning>
where
    T: Send + fmt::Debug + 'static,
{
    let path = entry.path();
    match entry.metadata() {
        Ok(metadata) => Ok(probe(&path, &metadata)),
        Err(err) => Err(warning_from_walk_error_at(&path, &err)),
    }
}

fn warning_from_walk_error(err: &jwalk::Error) -> ScanWarning {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    warning_from_walk_error_at(&path, err)
}

fn warning_from_walk_error_at(path: &Path, err: &jwalk::Error) -> ScanWarning {
    match err.io_error() {
        Some(io) => ScanWarning::read_error(path, io),
        None => ScanWarning::read_error(path, &io::Error::other(err.to_string())),
    }
}

/// Stat a single path and build its entry.
pub fn probe_path(path: &Path, follow_symlinks: bool) -> Result<FileEntry, ScanWarning> {
    let metadata = if follow_symlinks {
        std::fs::metadata(path)
    } else {
        std::fs::symlink_metadata(path)
    };

    metadata
        .map(|m| FileEntry::from_metadata(path, &m))
        .map_err(|e| ScanWarning::metadata(path, &e))
}

/// Stat many independent paths in parallel.
///
/// Paths that no longer exist are dropped silently; any other failure is
/// returned as a warning. Already-dispatched stats finish even if `cancel`
/// fires, but no new ones start.
pub fn probe_paths(
    paths: &[PathBuf],
    follow_symlinks: bool,
    cancel: &CancellationToken,
) -> (Vec<FileEntry>, Vec<ScanWarning>) {
    let results: Vec<Option<Result<FileEntry, ScanWarning>>> = paths
        .par_iter()
        .map(|path| {
            if cancel.is_cancelled() {
                return None;
            }
            match probe_path(path, follow_symlinks) {
                Ok(entry) => Some(Ok(entry)),
                Err(_) if !path_exists(path, follow_symlinks) => None,
                Err(warning) => Some(Err(warning)),
            }
        })
        .collect();

    let mut entries = Vec::with_capacity(results.len());
    let mut warnings = Vec::new();
    for result in results.into_iter().flatten() {
        match result {
            Ok(entry) => entries.push(entry),
            Err(warning) => warnings.push(warning),
        }
    }
    (entries, warnings)
}

/// Whether `path` is still present on disk.
///
/// Only a `NotFound` answer counts as gone; a path that cannot be stat'ed for
/// any other reason (permissions, I/O errors) is assumed to still exist.
pub fn path_exists(path: &Path, follow_symlinks: bool) -> bool {
    let metadata = if follow_symlinks {
        std::fs::metadata(path)
    } else {
        std::fs::symlink_metadata(path)
    };
    match metadata {
        Ok(_) => true,
        Err(err) => err.kind() != io::ErrorKind::NotFound,
    }
}
