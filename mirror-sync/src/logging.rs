//! Process-wide log setup.
//!
//! Every context logs through `tracing`; this module installs the subscriber
//! that formats those events to stdout, fanned out to the configured log file
//! when there is one. The file is rotated by size before it is opened, with
//! `mirror.log.1` the newest backup.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mirror_core::LogRotation;
use tracing_subscriber::{fmt, fmt::writer::MakeWriterExt, EnvFilter};

use crate::error::{io_err, SyncError};

/// Filter used when `RUST_LOG` is unset. Debug output from contexts is
/// already gated per source flag, so it is let through here.
pub const DEFAULT_FILTER: &str = "info,mirror_sync=debug";

/// Install the global subscriber. A second call is a no-op.
pub fn init(log_file: Option<&Path>, rotation: &LogRotation) -> Result<(), SyncError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match log_file {
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
        }
        Some(path) => {
            let file = open_log_file(path, rotation)?;
            let writer = io::stdout.and(Mutex::new(file));
            let _ = fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .try_init();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path, rotation: &LogRotation) -> Result<fs::File, SyncError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    rotate(path, rotation).map_err(|e| io_err(path, e))?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}

/// Move `path` aside once it has grown to `rotation.max_bytes`.
///
/// Backups shift up by one (`.1` → `.2`, …) and whatever would land past
/// `rotation.keep` is deleted. Returns whether the file was moved.
pub fn rotate(path: &Path, rotation: &LogRotation) -> io::Result<bool> {
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if len < rotation.max_bytes {
        return Ok(false);
    }

    if rotation.keep == 0 {
        remove_if_present(path)?;
        return Ok(true);
    }
    remove_if_present(&backup(path, rotation.keep))?;
    for n in (1..rotation.keep).rev() {
        rename_if_present(&backup(path, n), &backup(path, n + 1))?;
    }
    fs::rename(path, backup(path, 1))?;
    Ok(true)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn rename_if_present(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn backup(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rotation(max_bytes: u64, keep: usize) -> LogRotation {
        LogRotation { max_bytes, keep }
    }

    #[test]
    fn small_file_stays_put() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("mirror.log");
        fs::write(&log, "short").unwrap();
        assert!(!rotate(&log, &rotation(100, 3)).unwrap());
        assert!(log.exists());
        assert!(!backup(&log, 1).exists());
    }

    #[test]
    fn missing_file_is_not_rotated() {
        let tmp = TempDir::new().unwrap();
        assert!(!rotate(&tmp.path().join("absent.log"), &rotation(1, 3)).unwrap());
    }

    #[test]
    fn backups_shift_and_oldest_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("mirror.log");
        fs::write(backup(&log, 1), "one").unwrap();
        fs::write(backup(&log, 2), "two").unwrap();
        fs::write(&log, vec![b'x'; 200]).unwrap();

        assert!(rotate(&log, &rotation(100, 2)).unwrap());
        assert!(!log.exists());
        assert_eq!(fs::read(backup(&log, 1)).unwrap().len(), 200);
        assert_eq!(fs::read_to_string(backup(&log, 2)).unwrap(), "one");
        assert!(!backup(&log, 3).exists());
    }

    #[test]
    fn keep_zero_discards_full_file() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("mirror.log");
        fs::write(&log, vec![b'x'; 50]).unwrap();

        assert!(rotate(&log, &rotation(10, 0)).unwrap());
        assert!(!log.exists());
        assert!(!backup(&log, 1).exists());
    }

    #[test]
    fn open_log_file_creates_parent_dirs_and_appends() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("logs").join("mirror.log");
        {
            use std::io::Write;
            let mut f = open_log_file(&log, &LogRotation::default()).unwrap();
            f.write_all(b"first\n").unwrap();
            let mut f = open_log_file(&log, &LogRotation::default()).unwrap();
            f.write_all(b"second\n").unwrap();
        }
        assert_eq!(fs::read_to_string(&log).unwrap(), "first\nsecond\n");
    }
}
