//! Mirror core library — configuration, storage paths, file table, errors.
//!
//! Public API surface:
//! - [`config`] — YAML configuration load / save
//! - [`storage`] — resolving logical paths under the storage root
//! - [`file_table`] — persisted path → digest table
//! - [`error`] — [`CoreError`]
//! - [`types`] — [`SourceId`]

pub mod config;
pub mod error;
pub mod file_table;
pub mod storage;
pub mod types;

pub use config::{HttpConfig, LogRotation, MirrorConfig};
pub use error::CoreError;
pub use file_table::{FileMap, FileTable};
pub use types::SourceId;
