//! # mirror-sync
//!
//! Sync context and orchestration for mirroring files from external sources.
//!
//! A [`Mirror`] runs each registered [`Source`] in turn, handing it a fresh
//! [`Context`] that shares the run-wide [`HashCache`] and [`LiveSet`]. After
//! the run, [`Mirror::sweep`] reclaims files no source kept alive.

pub mod cache;
pub mod cancel;
pub mod context;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod pipeline;
pub mod reclaim;
pub mod source;

pub use cache::{HashCache, LiveSet};
pub use cancel::{CancelCause, CancelScope};
pub use context::Context;
pub use error::SyncError;
pub use mirror::{Mirror, SyncReport};
pub use reclaim::SweepResult;
pub use source::Source;
