//! Cause-carrying cancellation scopes.
//!
//! A [`CancelScope`] is a node in a tree. Cancelling a node is observed by
//! every descendant derived with [`CancelScope::child`], never by its
//! ancestors or siblings. The first cancellation of a node records its
//! [`CancelCause`]; later attempts are no-ops, so a cause is set at most once
//! and never cleared.
//!
//! Cancellation is cooperative: long-running work polls
//! [`CancelScope::is_cancelled`] or [`CancelScope::checkpoint`] at its I/O
//! choke points.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::SyncError;

/// Boxed error accepted as an abort cause.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Why a scope was cancelled.
#[derive(Debug, Clone)]
pub enum CancelCause {
    /// The owner released the scope without an error.
    Released,
    /// The scope was aborted with an error.
    Error(Arc<dyn Error + Send + Sync + 'static>),
}

impl CancelCause {
    /// The abort error, if this was not a plain release.
    pub fn error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            CancelCause::Released => None,
            CancelCause::Error(err) => Some(err.as_ref()),
        }
    }
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Released => f.write_str("scope released"),
            CancelCause::Error(err) => err.fmt(f),
        }
    }
}

#[derive(Debug, Default)]
struct ScopeInner {
    parent: Option<Arc<ScopeInner>>,
    cause: OnceLock<CancelCause>,
}

impl ScopeInner {
    /// Own cause first, then the nearest cancelled ancestor's.
    fn cause(&self) -> Option<&CancelCause> {
        self.cause
            .get()
            .or_else(|| self.parent.as_deref().and_then(ScopeInner::cause))
    }
}

/// Cloneable handle to one node of the cancellation tree.
///
/// Clones share the same node.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    inner: Arc<ScopeInner>,
}

impl CancelScope {
    /// A new root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child scope that observes this scope's cancellation.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                parent: Some(Arc::clone(&self.inner)),
                cause: OnceLock::new(),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cause().is_some()
    }

    /// The recorded cause, inherited from an ancestor if it was cancelled first.
    pub fn cause(&self) -> Option<CancelCause> {
        self.inner.cause().cloned()
    }

    /// Cancel with `cause`. Returns `true` only for the call that set it.
    pub fn cancel(&self, cause: CancelCause) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.inner.cause.set(cause).is_ok()
    }

    /// Cancel with an error cause.
    pub fn abort(&self, err: impl Into<BoxError>) -> bool {
        self.cancel(CancelCause::Error(Arc::from(err.into())))
    }

    /// Cancel with no error. Idempotent; keeps an earlier cause.
    pub fn release(&self) -> bool {
        self.cancel(CancelCause::Released)
    }

    /// `Err(SyncError::Aborted)` once the scope is cancelled.
    pub fn checkpoint(&self) -> Result<(), SyncError> {
        match self.inner.cause() {
            Some(cause) => Err(SyncError::Aborted {
                cause: cause.to_string(),
            }),
            None => Ok(()),
        }
    }
}
