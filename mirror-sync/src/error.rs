//! Error types for mirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use mirror_core::CoreError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from configuration, file table, or path resolution.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation observed a cancelled scope and stopped.
    #[error("aborted: {cause}")]
    Aborted { cause: String },

    /// A sweep was requested for a run in which some sources aborted.
    #[error("run incomplete, sources aborted: {}", .sources.join(", "))]
    IncompleteRun { sources: Vec<String> },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
