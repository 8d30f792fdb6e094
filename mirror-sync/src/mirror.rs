//! The orchestrator.
//!
//! ## `Mirror::sync` — one run
//!
//! 1. Create an empty [`LiveSet`] for the run.
//! 2. For each source, in registration order and one at a time:
//!    build a fresh [`Context`] on a child of the run scope, sharing the
//!    mirror's [`HashCache`] and the run's [`LiveSet`]; call
//!    [`Source::sync`]; release the context's scope. A source reached after
//!    the run scope was cancelled still runs, with a context that already
//!    reports [`Context::aborted`].
//! 3. Return the marks and any aborted sources as a [`SyncReport`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use mirror_core::{storage, FileMap, HttpConfig, MirrorConfig, SourceId};

use crate::cache::{HashCache, LiveSet};
use crate::cancel::{CancelCause, CancelScope};
use crate::context::Context;
use crate::error::SyncError;
use crate::reclaim::{self, SweepResult};
use crate::source::Source;

/// Build the shared HTTP agent from config.
pub fn http_agent(config: &HttpConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(config.timeout())
        .user_agent(&config.user_agent)
        .build()
}

/// Outcome of one [`Mirror::sync`] call.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Paths kept alive by any source during the run.
    pub live: LiveSet,
    /// Sources whose context ended aborted, with the cause.
    pub aborted: BTreeMap<SourceId, CancelCause>,
}

impl SyncReport {
    /// True when every source ran to completion without aborting.
    pub fn is_complete(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Releases a context's scope when dropped, including during unwinding.
struct ReleaseOnDrop<'a>(&'a Context);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Owns the authoritative file table and the ordered list of sources.
pub struct Mirror {
    files: HashCache,
    sources: Vec<Box<dyn Source>>,
    storage_path: PathBuf,
    http: ureq::Agent,
}

impl Mirror {
    pub fn new(storage_path: impl Into<PathBuf>, http: ureq::Agent) -> Self {
        Self {
            files: HashCache::new(),
            sources: Vec::new(),
            storage_path: storage_path.into(),
            http,
        }
    }

    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::new(config.storage_path.clone(), http_agent(&config.http))
    }

    /// Seed the file table, e.g. from [`mirror_core::file_table::load_at`].
    ///
    /// Keys are normalized the way [`Context::hash`] keys them. Entries that
    /// cannot name a file under the storage root are dropped.
    pub fn with_files(mut self, files: FileMap) -> Self {
        let mut table = FileMap::with_capacity(files.len());
        for (path, digest) in files {
            match storage::normalize(&path) {
                Ok(key) => {
                    table.entry(key).or_insert(digest);
                }
                Err(err) => tracing::warn!("dropping file table entry: {err}"),
            }
        }
        self.files = HashCache::from_files(table);
        self
    }

    pub fn add_source(&mut self, source: impl Source + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn add_boxed_source(&mut self, source: Box<dyn Source>) {
        self.sources.push(source);
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Snapshot of the file table.
    pub fn files(&self) -> FileMap {
        self.files.snapshot()
    }

    /// Run every source once, in order, against `parent`.
    ///
    /// Takes `&mut self`: overlapping runs on one mirror are not supported.
    /// A source that panics releases its context before the panic continues.
    pub fn sync(&mut self, parent: &CancelScope) -> SyncReport {
        let mut report = SyncReport::default();

        for source in &self.sources {
            let id = SourceId::from(source.id());
            if let Some(cause) = parent.cause() {
                tracing::warn!(source = %id, "run already cancelled: {cause}");
            }

            let ctx = Context::new(
                parent,
                &**source,
                &self.files,
                &report.live,
                &self.storage_path,
                &self.http,
            );
            let started = Instant::now();
            tracing::info!(source = %id, "sync started");
            {
                let _release = ReleaseOnDrop(&ctx);
                source.sync(&ctx);
                if let Some(cause) = ctx.abort_cause() {
                    report.aborted.insert(id.clone(), cause);
                }
            }
            tracing::info!(
                source = %id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "sync finished"
            );
        }

        tracing::info!(
            sources = self.sources.len(),
            live = report.live.len(),
            aborted = report.aborted.len(),
            "run finished"
        );
        report
    }

    /// Reclaim files the run did not keep alive.
    ///
    /// Deletes each stale file under the storage root and drops its entry
    /// from the file table; with `dry_run` nothing is changed. Fails with
    /// [`SyncError::IncompleteRun`] if any source aborted during the run.
    pub fn sweep(
        &mut self,
        report: &SyncReport,
        dry_run: bool,
    ) -> Result<Vec<SweepResult>, SyncError> {
        reclaim::sweep(&self.files, &self.storage_path, report, dry_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    type Step = Box<dyn Fn(&Context) + Send + Sync>;

    struct FnSource {
        id: &'static str,
        step: Step,
    }

    impl FnSource {
        fn new(id: &'static str, step: impl Fn(&Context) + Send + Sync + 'static) -> Self {
            Self {
                id,
                step: Box::new(step),
            }
        }
    }

    impl Source for FnSource {
        fn id(&self) -> &str {
            self.id
        }

        fn sync(&self, ctx: &Context) {
            (self.step)(ctx)
        }
    }

    fn mirror(root: &Path) -> Mirror {
        Mirror::new(root, ureq::Agent::new())
    }

    #[test]
    fn sources_run_in_registration_order() {
        let tmp = TempDir::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut m = mirror(tmp.path());
        for id in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            m.add_source(FnSource::new(id, move |ctx| {
                order.lock().unwrap().push(ctx.id().to_string())
            }));
        }
        assert_eq!(m.source_ids(), vec!["first", "second", "third"]);

        let report = m.sync(&CancelScope::new());
        assert!(report.is_complete());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn scope_is_released_after_sync() {
        let tmp = TempDir::new().unwrap();
        let seen: Arc<Mutex<Option<CancelScope>>> = Arc::default();
        let mut m = mirror(tmp.path());
        let slot = Arc::clone(&seen);
        m.add_source(FnSource::new("a", move |ctx| {
            assert!(!ctx.aborted());
            *slot.lock().unwrap() = Some(ctx.scope().clone());
        }));

        let report = m.sync(&CancelScope::new());
        let scope = seen.lock().unwrap().clone().expect("scope captured");
        assert!(scope.is_cancelled());
        assert!(matches!(scope.cause(), Some(CancelCause::Released)));
        assert!(report.is_complete());
    }

    #[test]
    fn abort_is_recorded_and_does_not_stop_later_sources() {
        let tmp = TempDir::new().unwrap();
        let ran = Arc::new(Mutex::new(HashSet::new()));
        let mut m = mirror(tmp.path());

        m.add_source(FnSource::new("broken", |ctx| {
            ctx.abort_with_err("listing failed")
        }));
        let r = Arc::clone(&ran);
        m.add_source(FnSource::new("healthy", move |ctx| {
            assert!(!ctx.aborted(), "sibling abort must not leak");
            r.lock().unwrap().insert(ctx.id().to_string());
        }));

        let parent = CancelScope::new();
        let report = m.sync(&parent);
        assert!(!parent.is_cancelled());
        assert!(ran.lock().unwrap().contains("healthy"));
        assert!(!report.is_complete());
        let cause = &report.aborted[&SourceId::from("broken")];
        assert_eq!(cause.to_string(), "listing failed");
        assert!(!report.aborted.contains_key(&SourceId::from("healthy")));
    }

    #[test]
    fn cancelled_parent_hands_later_sources_an_aborted_context() {
        let tmp = TempDir::new().unwrap();
        let parent = CancelScope::new();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let mut m = mirror(tmp.path());

        let p = parent.clone();
        let r = Arc::clone(&ran);
        m.add_source(FnSource::new("first", move |ctx| {
            r.lock().unwrap().push(("first", ctx.aborted()));
            p.abort("shutdown requested");
            assert!(ctx.aborted(), "run-wide cancel reaches the active context");
        }));
        let r = Arc::clone(&ran);
        m.add_source(FnSource::new("second", move |ctx| {
            r.lock().unwrap().push(("second", ctx.aborted()))
        }));

        let report = m.sync(&parent);
        assert_eq!(
            *ran.lock().unwrap(),
            vec![("first", false), ("second", true)]
        );
        assert_eq!(report.aborted.len(), 2);
        assert_eq!(
            report.aborted[&SourceId::from("second")].to_string(),
            "shutdown requested"
        );
    }

    #[test]
    fn panicking_source_still_releases_scope() {
        let tmp = TempDir::new().unwrap();
        let seen: Arc<Mutex<Option<CancelScope>>> = Arc::default();
        let mut m = mirror(tmp.path());
        let slot = Arc::clone(&seen);
        m.add_source(FnSource::new("panics", move |ctx| {
            *slot.lock().unwrap() = Some(ctx.scope().clone());
            panic!("source bug");
        }));

        let result = catch_unwind(AssertUnwindSafe(|| m.sync(&CancelScope::new())));
        assert!(result.is_err());
        let scope = seen.lock().unwrap().clone().expect("scope captured");
        assert!(scope.is_cancelled());
    }

    #[test]
    fn contexts_share_one_cache_and_live_set() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("f"), "data").unwrap();
        let mut m = mirror(tmp.path());

        m.add_source(FnSource::new("a", |ctx| {
            ctx.hash("f").unwrap();
            ctx.keep_alive("x");
        }));
        m.add_source(FnSource::new("b", |ctx| {
            // Removing the file proves the digest comes from a's cache entry.
            std::fs::remove_file(ctx.storage_path().join("f")).unwrap();
            ctx.hash("f").unwrap();
            ctx.keep_alive("y");
        }));
        let report = m.sync(&CancelScope::new());

        assert!(report.is_complete());
        assert!(report.live.contains("x") && report.live.contains("y"));
        assert!(m.files().contains_key("f"));
    }

    #[test]
    fn with_files_normalizes_keys_and_drops_escaping_ones() {
        let tmp = TempDir::new().unwrap();
        let files = FileMap::from([
            ("./a.txt".to_string(), "aa".to_string()),
            ("../outside".to_string(), "bb".to_string()),
            ("dir/../b.txt".to_string(), "cc".to_string()),
        ]);
        let m = mirror(tmp.path()).with_files(files);

        let table = m.files();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a.txt").map(String::as_str), Some("aa"));
        assert_eq!(table.get("b.txt").map(String::as_str), Some("cc"));
    }

    #[test]
    fn from_config_uses_storage_path() {
        let config = MirrorConfig::new("/srv/mirror");
        let m = Mirror::from_config(&config);
        assert_eq!(m.storage_path(), Path::new("/srv/mirror"));
        assert!(m.files().is_empty());
    }
}
