//! Per-source sync context.
//!
//! A [`Context`] is built fresh for every source in every run. It bundles:
//!
//! 1. a child [`CancelScope`] of the run's scope, aborted with a cause via
//!    [`Context::abort_with_err`];
//! 2. info / debug / error logging tagged with the source id, debug lines
//!    gated by the source's declared flags;
//! 3. the run-wide [`HashCache`] and [`LiveSet`], shared with every other
//!    context of the run;
//! 4. the storage root, under which every created or hashed file resolves;
//! 5. the shared HTTP agent.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mirror_core::{storage, SourceId};

use crate::cache::{hash_file, HashCache, LiveSet};
use crate::cancel::{BoxError, CancelCause, CancelScope};
use crate::error::{io_err, SyncError};
use crate::source::Source;

/// Debug flag that traces cache misses in [`Context::hash`].
pub const DEBUG_HASH: &str = "hash";

/// Execution handle passed to [`Source::sync`]. Clones share all state.
#[derive(Clone)]
pub struct Context {
    id: SourceId,
    debug_flags: Arc<HashSet<String>>,
    scope: CancelScope,
    hashes: HashCache,
    live: LiveSet,
    storage_path: PathBuf,
    http: ureq::Agent,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("debug_flags", &self.debug_flags)
            .field("aborted", &self.aborted())
            .field("storage_path", &self.storage_path)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context for `source` on a child scope of `parent`.
    pub fn new(
        parent: &CancelScope,
        source: &dyn Source,
        hashes: &HashCache,
        live: &LiveSet,
        storage_path: &Path,
        http: &ureq::Agent,
    ) -> Self {
        Self {
            id: SourceId::from(source.id()),
            debug_flags: Arc::new(source.debug()),
            scope: parent.child(),
            hashes: hashes.clone(),
            live: live.clone(),
            storage_path: storage_path.to_path_buf(),
            http: http.clone(),
        }
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// This context's scope; derive children from it for sub-tasks.
    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    // -----------------------------------------------------------------------
    // Logging
    // -----------------------------------------------------------------------

    /// Whether debug output for `flag` is enabled.
    pub fn debugging(&self, flag: &str) -> bool {
        self.debug_flags.contains(flag)
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(source = %self.id, "{args}");
    }

    /// Emit a debug line, only if the source enabled `flag`.
    pub fn debug(&self, flag: &str, args: fmt::Arguments<'_>) {
        if self.debugging(flag) {
            tracing::debug!(source = %self.id, flag, "{args}");
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(source = %self.id, "{args}");
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Log `err` and cancel this context with it as the cause.
    ///
    /// Only the first abort records its cause; later ones are logged only.
    pub fn abort_with_err(&self, err: impl Into<BoxError>) {
        let err = err.into();
        self.error(format_args!("aborted: {err}"));
        self.scope.abort(err);
    }

    /// Whether this context, or the run it belongs to, was cancelled.
    pub fn aborted(&self) -> bool {
        self.scope.is_cancelled()
    }

    pub fn abort_cause(&self) -> Option<CancelCause> {
        self.scope.cause()
    }

    pub(crate) fn release(&self) {
        self.scope.release();
    }

    // -----------------------------------------------------------------------
    // Shared state
    // -----------------------------------------------------------------------

    /// SHA-256 hex digest of the file at `path` under the storage root.
    ///
    /// Digests are keyed by the normalized path, so `"./a.txt"` and `"a.txt"`
    /// share one entry. Cached digests are returned without touching the
    /// file. On a miss the file is streamed outside any lock and the result
    /// recorded; failures leave the cache untouched.
    pub fn hash(&self, path: &str) -> Result<String, SyncError> {
        let key = storage::normalize(path)?;
        if let Some(digest) = self.hashes.get(&key) {
            return Ok(digest);
        }
        let full = storage::resolve(&self.storage_path, &key)?;
        let digest = hash_file(&full, &self.scope)?;
        self.debug(DEBUG_HASH, format_args!("hashed {key}: {digest}"));
        Ok(self.hashes.insert(&key, digest))
    }

    /// Forget the cached digest for `path` so the next [`hash`](Self::hash)
    /// reads the file again.
    pub fn invalidate(&self, path: &str) -> Option<String> {
        let key = storage::normalize(path).ok()?;
        self.hashes.remove(&key)
    }

    /// Mark `path` as still wanted in this run.
    ///
    /// A path that cannot name a file under the storage root is never
    /// tracked, so marking it is logged and otherwise ignored.
    pub fn keep_alive(&self, path: &str) {
        match storage::normalize(path) {
            Ok(key) => self.live.mark(&key),
            Err(err) => tracing::warn!(source = %self.id, "keep_alive ignored: {err}"),
        }
    }

    // -----------------------------------------------------------------------
    // Storage & transport
    // -----------------------------------------------------------------------

    /// Create (or truncate) `path` under the storage root for writing.
    ///
    /// Parent directories must already exist.
    pub fn create(&self, path: &str) -> Result<File, SyncError> {
        let full = storage::resolve(&self.storage_path, path)?;
        File::create(&full).map_err(|e| io_err(full, e))
    }

    /// Start a request on the shared HTTP agent.
    pub fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.http.request(method, url)
    }

    /// Send `req` as-is and return the transport's result unchanged.
    pub fn do_http(&self, req: ureq::Request) -> Result<ureq::Response, ureq::Error> {
        req.call()
    }
}
