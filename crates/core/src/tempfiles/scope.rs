//! Temp file ownership scope.

use futures::future::join_all;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::TempStore;
use super::ScopeError;
use crate::metrics;

/// Identity of one task for scope bookkeeping.
///
/// A lease admits at most one open [`TempScope`] at a time. Clones share the
/// same state, so a clone handed to nested code still sees the open scope.
#[derive(Debug, Clone, Default)]
pub struct ScopeLease {
    active: Arc<AtomicBool>,
}

impl ScopeLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a scope is currently open under this lease.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// How a reserved path is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameHint {
    /// Random name, no extension.
    Random,
    /// Random name with this extension.
    Extension(String),
    /// This exact path. Bare file names are placed in the temp directory.
    Exact(PathBuf),
}

impl From<Option<&str>> for NameHint {
    fn from(value: Option<&str>) -> Self {
        match value {
            None => NameHint::Random,
            Some(s) => NameHint::from(s),
        }
    }
}

/// A string containing a `.` or a path separator is a file name,
/// anything else is an extension.
impl From<&str> for NameHint {
    fn from(value: &str) -> Self {
        if value.contains('.') || value.contains(std::path::MAIN_SEPARATOR) {
            NameHint::Exact(PathBuf::from(value))
        } else {
            NameHint::Extension(value.to_string())
        }
    }
}

impl From<PathBuf> for NameHint {
    fn from(value: PathBuf) -> Self {
        NameHint::Exact(value)
    }
}

/// Outcome of closing a scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseReport {
    /// Distinct paths a deletion was attempted for.
    pub attempted: usize,
    /// Paths that existed and were deleted.
    pub removed: usize,
    /// Paths that were never written or were already gone.
    pub missing: usize,
    /// Paths whose deletion failed for another reason.
    pub failed: usize,
}

/// Ownership scope for the temp files of one task.
///
/// Dropping an unclosed scope deletes its files synchronously, so early
/// returns and panics do not leak.
#[derive(Debug)]
pub struct TempScope {
    store: TempStore,
    lease: ScopeLease,
    paths: Vec<PathBuf>,
}

impl TempScope {
    pub(super) fn open(store: TempStore, lease: ScopeLease) -> Result<Self, ScopeError> {
        if !lease.try_acquire() {
            return Err(ScopeError::AlreadyOpen);
        }
        debug!("Temp file scope opened");
        Ok(Self {
            store,
            lease,
            paths: Vec::new(),
        })
    }

    /// Reserves a path and records it for cleanup.
    ///
    /// Nothing is created on disk; the caller writes the file.
    pub fn reserve(&mut self, hint: impl Into<NameHint>) -> PathBuf {
        let path = match hint.into() {
            NameHint::Random => self.store.fresh_path(None),
            NameHint::Extension(ext) => self.store.fresh_path(Some(&ext)),
            NameHint::Exact(path) if path.is_absolute() => path,
            NameHint::Exact(path) => self.store.dir().join(path),
        };
        debug!("Reserved temp file {:?}", path);
        self.paths.push(path.clone());
        path
    }

    /// Takes ownership of paths reserved elsewhere, e.g. by an isolated worker.
    pub fn adopt(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        let before = self.paths.len();
        self.paths.extend(paths);
        if self.paths.len() > before {
            debug!("Adopted {} temp files", self.paths.len() - before);
        }
    }

    /// Paths owned by this scope, in reservation order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether `path` is owned by this scope.
    pub fn owns(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The store this scope reserves into.
    pub fn store(&self) -> &TempStore {
        &self.store
    }

    /// Deletes every owned path. Never fails; errors are logged.
    pub async fn close(mut self) -> CloseReport {
        let paths = unique(std::mem::take(&mut self.paths));
        debug!("Temp file scope closing with {} files", paths.len());

        let results = join_all(paths.iter().map(tokio::fs::remove_file)).await;

        let mut report = CloseReport {
            attempted: paths.len(),
            ..Default::default()
        };
        for (path, result) in paths.iter().zip(results) {
            tally(&mut report, path, result);
        }
        metrics::TEMP_FILES_REMOVED.inc_by(report.removed as u64);
        report
    }

    /// Releases the scope without deleting anything and returns its paths.
    ///
    /// Used by isolated workers, whose files are cleaned up by the caller's
    /// scope after being adopted.
    pub fn detach(mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths)
    }
}

impl Drop for TempScope {
    fn drop(&mut self) {
        if !self.paths.is_empty() {
            let paths = unique(std::mem::take(&mut self.paths));
            warn!("Temp file scope dropped without close, removing {} files", paths.len());
            let mut report = CloseReport::default();
            for path in &paths {
                tally(&mut report, path, std::fs::remove_file(path));
            }
        }
        self.lease.release();
    }
}

fn tally(report: &mut CloseReport, path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => report.removed += 1,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Temp file {:?} was never written or already removed", path);
            report.missing += 1;
        }
        Err(e) => {
            warn!("Failed to remove temp file {:?}: {}", path, e);
            report.failed += 1;
        }
    }
}

fn unique(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
