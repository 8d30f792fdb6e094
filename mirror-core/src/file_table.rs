//! Persisted file table — the authoritative record of what is mirrored.
//!
//! Persists a [`FileTable`] JSON document at `<home>/.mirror/files.json`,
//! mapping logical paths to the SHA-256 hex digest last recorded for them.
//! Writes use the same atomic `.tmp` + rename pattern as the config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{home, mirror_root};
use crate::error::{io_err, CoreError};

/// In-memory file map: logical path → SHA-256 hex digest.
pub type FileMap = HashMap<String, String>;

/// On-disk file table payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileTable {
    /// When the run that produced this table started.
    pub synced_at: DateTime<Utc>,
    pub files: FileMap,
}

impl FileTable {
    pub fn new(synced_at: DateTime<Utc>, files: FileMap) -> Self {
        Self { synced_at, files }
    }
}

/// `<home>/.mirror/files.json`
pub fn table_path_at(home: &Path) -> PathBuf {
    mirror_root(home).join("files.json")
}

/// Load the file table.
///
/// Returns an empty table if the file does not yet exist.
pub fn load_at(home: &Path) -> Result<FileTable, CoreError> {
    let path = table_path_at(home);
    if !path.exists() {
        return Ok(FileTable::new(Utc::now(), FileMap::new()));
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<FileTable, CoreError> {
    load_at(&home()?)
}

/// Save the file table atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(home: &Path, table: &FileTable) -> Result<(), CoreError> {
    let dir = mirror_root(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = table_path_at(home);
    let json = serde_json::to_string_pretty(table)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(table: &FileTable) -> Result<(), CoreError> {
    save_at(&home()?, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_table_when_file_missing() {
        let home = TempDir::new().unwrap();
        let table = load_at(home.path()).unwrap();
        assert!(table.files.is_empty());
    }

    #[test]
    fn roundtrip_save_load() {
        let home = TempDir::new().unwrap();
        let mut files = FileMap::new();
        files.insert("a.txt".to_string(), "deadbeef".to_string());
        files.insert("libraries/x/1.0/x.jar".to_string(), "cafebabe".to_string());
        let table = FileTable::new(Utc::now(), files);

        save_at(home.path(), &table).unwrap();
        let loaded = load_at(home.path()).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let home = TempDir::new().unwrap();
        save_at(home.path(), &FileTable::new(Utc::now(), FileMap::new())).unwrap();
        let tmp = table_path_at(home.path()).with_extension("json.tmp");
        assert!(!tmp.exists(), "tmp file should be removed after atomic rename");
    }

    #[test]
    fn corrupt_table_is_a_json_error() {
        let home = TempDir::new().unwrap();
        let path = table_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, CoreError::Json(_)), "got: {err}");
    }
}
