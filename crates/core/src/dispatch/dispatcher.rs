//! Caller side: launch, merge reserved paths, unwrap the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::launcher::WorkerLauncher;
use super::protocol::{WorkerOutcome, WorkerRequest};
use super::DispatchError;
use crate::metrics;
use crate::tempfiles::TempScope;
use crate::transform::TransformOutput;

/// Runs sync transforms in isolated workers, one fresh worker per call.
#[derive(Clone)]
pub struct ParallelDispatcher {
    launcher: Arc<dyn WorkerLauncher>,
}

impl ParallelDispatcher {
    pub fn new(launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self { launcher }
    }

    /// Runs `transform` in a worker.
    ///
    /// Whatever the worker reserved is adopted into `scope` before the
    /// outcome is inspected, so a failing transform's files are still
    /// cleaned up by the caller.
    pub async fn dispatch(
        &self,
        transform: &str,
        inputs: &[PathBuf],
        args: &[String],
        scope: &mut TempScope,
    ) -> Result<TransformOutput, DispatchError> {
        let temp_dir = scope.store().dir().to_path_buf();
        let request = WorkerRequest {
            transform: transform.to_string(),
            inputs: inputs.to_vec(),
            args: args.to_vec(),
            temp_dir: temp_dir.clone(),
        };

        let reply = match self.launcher.launch(request).await {
            Ok(reply) => reply,
            Err(e) => {
                metrics::WORKER_INVOCATIONS
                    .with_label_values(&["crashed"])
                    .inc();
                return Err(e);
            }
        };

        let (inside, outside): (Vec<_>, Vec<_>) = reply
            .reserved
            .into_iter()
            .partition(|p| p.starts_with(&temp_dir));
        if !outside.is_empty() {
            warn!(count = outside.len(), "Worker reported paths outside the temp directory");
        }
        debug!(transform, count = inside.len(), "Merging worker temp files");
        scope.adopt(inside);

        match reply.outcome {
            WorkerOutcome::Ok(output) => {
                metrics::WORKER_INVOCATIONS.with_label_values(&["ok"]).inc();
                Ok(output)
            }
            WorkerOutcome::Err(failure) => {
                metrics::WORKER_INVOCATIONS
                    .with_label_values(&["transform_error"])
                    .inc();
                Err(DispatchError::Transform(failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{InProcessLauncher, WorkerFailure, WorkerReply};
    use crate::tempfiles::{ScopeLease, TempStore};
    use crate::transform::{SyncTransform, TransformError, TransformRegistry};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Leaky {
        fail: bool,
    }

    impl SyncTransform for Leaky {
        fn name(&self) -> &str {
            "leaky"
        }

        fn run(
            &self,
            _inputs: &[PathBuf],
            _args: &[String],
            scope: &mut TempScope,
        ) -> Result<TransformOutput, TransformError> {
            let scratch = scope.reserve("tmp");
            std::fs::write(&scratch, b"scratch")?;
            if self.fail {
                return Err(TransformError::Failed("encoder exploded".to_string()));
            }
            let out = scope.reserve("png");
            std::fs::write(&out, b"result")?;
            Ok(TransformOutput::File(out))
        }
    }

    fn dispatcher(fail: bool) -> ParallelDispatcher {
        let registry = TransformRegistry::new().register(Arc::new(Leaky { fail }));
        ParallelDispatcher::new(Arc::new(InProcessLauncher::new(registry)))
    }

    #[tokio::test]
    async fn test_success_merges_into_caller_scope() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();

        let out = dispatcher(false)
            .dispatch("leaky", &[], &[], &mut scope)
            .await
            .unwrap();

        assert_eq!(scope.len(), 2);
        let TransformOutput::File(path) = out else {
            panic!("expected a file");
        };
        assert!(scope.owns(&path));

        let report = scope.close().await;
        assert_eq!(report.removed, 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failure_merges_before_returning_error() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();

        let err = dispatcher(true)
            .dispatch("leaky", &[], &[], &mut scope)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Transform(ref f) if f.message == "encoder exploded"));
        assert_eq!(scope.len(), 1);
        scope.close().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    struct Scripted(WorkerReply);

    #[async_trait]
    impl WorkerLauncher for Scripted {
        async fn launch(&self, _request: WorkerRequest) -> Result<WorkerReply, DispatchError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_foreign_paths_not_adopted() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();

        let reply = WorkerReply {
            outcome: WorkerOutcome::Err(WorkerFailure::internal("x")),
            reserved: vec![dir.path().join("AbCdEfGh.png"), PathBuf::from("/etc/passwd")],
        };
        let dispatcher = ParallelDispatcher::new(Arc::new(Scripted(reply)));
        let _ = dispatcher.dispatch("any", &[], &[], &mut scope).await;

        assert_eq!(scope.paths(), &[dir.path().join("AbCdEfGh.png")]);
    }
}
