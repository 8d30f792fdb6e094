//! Sweep phase: reclaim files no source kept alive.
//!
//! A path is stale when the file table tracks it but the run's [`LiveSet`]
//! does not contain it. Sweeping is refused for incomplete runs: an aborted
//! source never marked its files, so they would all look stale.

use std::io::ErrorKind;
use std::path::Path;

use mirror_core::{storage, FileMap};

use crate::cache::{HashCache, LiveSet};
use crate::error::{io_err, SyncError};
use crate::mirror::SyncReport;

/// Outcome for one stale path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepResult {
    /// The file was deleted and its entry dropped.
    Removed { path: String },
    /// The file was already missing; its entry was dropped.
    AlreadyGone { path: String },
    /// Dry run: the file *would* have been removed.
    WouldRemove { path: String },
}

impl SweepResult {
    pub fn path(&self) -> &str {
        match self {
            SweepResult::Removed { path }
            | SweepResult::AlreadyGone { path }
            | SweepResult::WouldRemove { path } => path,
        }
    }
}

/// Tracked paths not marked live, sorted.
///
/// Table keys are compared in normalized form, the form marks are stored in.
/// A key that cannot name a file under the storage root is never stale.
pub fn stale_paths(files: &FileMap, live: &LiveSet) -> Vec<String> {
    let mut stale: Vec<String> = files
        .keys()
        .filter(|path| match storage::normalize(path) {
            Ok(key) => !live.contains(&key),
            Err(_) => false,
        })
        .cloned()
        .collect();
    stale.sort();
    stale
}

/// Delete stale files under `storage_path` and drop them from `files`.
pub(crate) fn sweep(
    files: &HashCache,
    storage_path: &Path,
    report: &SyncReport,
    dry_run: bool,
) -> Result<Vec<SweepResult>, SyncError> {
    if !report.is_complete() {
        return Err(SyncError::IncompleteRun {
            sources: report.aborted.keys().map(|id| id.to_string()).collect(),
        });
    }

    let stale = stale_paths(&files.snapshot(), &report.live);
    let mut results = Vec::with_capacity(stale.len());
    for path in stale {
        if dry_run {
            tracing::info!("[dry-run] would remove: {path}");
            results.push(SweepResult::WouldRemove { path });
            continue;
        }

        let full = storage::resolve(storage_path, &path)?;
        let result = match std::fs::remove_file(&full) {
            Ok(()) => {
                tracing::info!("removed: {path}");
                SweepResult::Removed { path }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("already gone: {path}");
                SweepResult::AlreadyGone { path }
            }
            Err(err) => return Err(io_err(full, err)),
        };
        files.remove(result.path());
        results.push(result);
    }

    if !results.is_empty() {
        tracing::info!(
            "swept {} stale file(s): {}",
            results.len(),
            preview_paths(&results)
        );
    }
    Ok(results)
}

fn preview_paths(results: &[SweepResult]) -> String {
    let mut shown: Vec<String> = results
        .iter()
        .take(3)
        .map(|r| r.path().to_string())
        .collect();
    if results.len() > shown.len() {
        shown.push(format!("+{} more", results.len() - shown.len()));
    }
    shown.join(", ")
}
