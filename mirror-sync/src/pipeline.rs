//! Full run pipeline: load state, mark, sweep, save.
//!
//! 1. Load `config.yaml`, install logging (stdout plus the configured log
//!    file), and load `files.json` from `<home>/.mirror/`.
//! 2. Build a [`Mirror`] seeded with the file table and register sources.
//! 3. [`Mirror::sync`] (mark phase).
//! 4. [`Mirror::sweep`] if every source completed; skipped otherwise.
//! 5. Save the file table (skipped in dry-run).
//!
//! `dry_run` only affects steps 4 and 5: sources still run and may write
//! files, but nothing is deleted and the table on disk is left unchanged.

use std::path::Path;

use chrono::Utc;

use mirror_core::{config, file_table, FileTable};

use crate::cancel::CancelScope;
use crate::error::SyncError;
use crate::logging;
use crate::mirror::Mirror;
use crate::reclaim::SweepResult;
use crate::source::Source;

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    /// Entries in the file table after the sweep.
    pub tracked: usize,
    /// Paths kept alive during the run.
    pub live: usize,
    pub swept: Vec<SweepResult>,
    /// Ids of sources that aborted, in id order.
    pub aborted: Vec<String>,
}

/// Run every source against the mirror rooted at `home`.
pub fn run_at(
    home: &Path,
    sources: Vec<Box<dyn Source>>,
    parent: &CancelScope,
    dry_run: bool,
) -> Result<RunSummary, SyncError> {
    let started_at = Utc::now();
    let config = config::load_at(home)?;
    logging::init(config.log_file.as_deref(), &config.log_rotation)?;
    let table = file_table::load_at(home)?;

    let mut mirror = Mirror::from_config(&config).with_files(table.files);
    for source in sources {
        mirror.add_boxed_source(source);
    }

    let report = mirror.sync(parent);
    let aborted: Vec<String> = report.aborted.keys().map(|id| id.to_string()).collect();

    let swept = if report.is_complete() {
        mirror.sweep(&report, dry_run)?
    } else {
        tracing::warn!(
            "sweep skipped, {} source(s) aborted: {}",
            aborted.len(),
            aborted.join(", ")
        );
        Vec::new()
    };

    let files = mirror.files();
    if !dry_run {
        file_table::save_at(home, &FileTable::new(started_at, files.clone()))?;
    }

    Ok(RunSummary {
        tracked: files.len(),
        live: report.live.len(),
        swept,
        aborted,
    })
}

/// `run_at` convenience wrapper using the user's home directory.
pub fn run(
    sources: Vec<Box<dyn Source>>,
    parent: &CancelScope,
    dry_run: bool,
) -> Result<RunSummary, SyncError> {
    run_at(&config::home()?, sources, parent, dry_run)
}
