//! The capability a mirror source implements.

use std::collections::HashSet;

use crate::context::Context;

/// One origin of mirrored content.
///
/// A source decides what to fetch and how to retry; everything it touches on
/// the local side (hashing, file creation, liveness marks, logging, HTTP)
/// goes through the [`Context`] it is handed. It may fan the work out to as
/// many threads as it likes: `Context` is `Clone + Send + Sync`.
///
/// Failures are reported through [`Context::abort_with_err`], which the
/// orchestrator records in the run's [`SyncReport`](crate::SyncReport).
pub trait Source: Send + Sync {
    /// Stable identifier used to tag log lines.
    fn id(&self) -> &str;

    /// Debug flags this source wants enabled, see [`Context::debug`].
    fn debug(&self) -> HashSet<String> {
        HashSet::new()
    }

    fn sync(&self, ctx: &Context);
}
