//! Ways of starting an isolated worker.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::protocol::{WorkerReply, WorkerRequest};
use super::worker::execute_request;
use super::DispatchError;
use crate::exec::ProcessRunner;
use crate::transform::TransformRegistry;

/// Starts a fresh worker for each request.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, request: WorkerRequest) -> Result<WorkerReply, DispatchError>;
}

/// Launches a worker as a child process speaking JSON over stdio.
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    runner: ProcessRunner,
}

impl ProcessLauncher {
    /// `program args...` must start a process that serves one request.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, runner: ProcessRunner) -> Self {
        Self {
            program: program.into(),
            args,
            runner,
        }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, request: WorkerRequest) -> Result<WorkerReply, DispatchError> {
        let payload =
            serde_json::to_vec(&request).map_err(|e| DispatchError::Protocol(e.to_string()))?;

        let mut child = self
            .runner
            .command(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DispatchError::Launch)?;
        debug!(pid = child.id().unwrap_or_default(), transform = %request.transform, "Worker started");

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(DispatchError::Launch)?;
            // Closing stdin marks the end of the request.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(DispatchError::Launch)?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match stdout.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => serde_json::from_str(line).map_err(|e| {
                warn!(error = %e, "Unreadable worker reply");
                DispatchError::Protocol(e.to_string())
            }),
            None => Err(DispatchError::Crashed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// Runs requests on the blocking thread pool instead of a child process.
///
/// Same protocol semantics without crash isolation; used in tests and when
/// no worker executable is available.
#[derive(Clone)]
pub struct InProcessLauncher {
    registry: TransformRegistry,
}

impl InProcessLauncher {
    pub fn new(registry: TransformRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, request: WorkerRequest) -> Result<WorkerReply, DispatchError> {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || execute_request(&registry, request))
            .await
            .map_err(|e| DispatchError::Crashed {
                code: None,
                stderr: e.to_string(),
            })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::dispatch::{WorkerFailure, WorkerOutcome};

    fn request() -> WorkerRequest {
        WorkerRequest {
            transform: "mirror".to_string(),
            inputs: vec![],
            args: vec![],
            temp_dir: PathBuf::from("/tmp"),
        }
    }

    #[tokio::test]
    async fn test_process_launcher_reads_reply_line() {
        let reply = WorkerReply::failed(WorkerFailure::internal("scripted"));
        let script = format!(
            "cat > /dev/null; echo 'log noise' >&2; echo '{}'",
            serde_json::to_string(&reply).unwrap()
        );
        let launcher = ProcessLauncher::new(
            "sh",
            vec!["-c".to_string(), script],
            ProcessRunner::default(),
        );

        let got = launcher.launch(request()).await.unwrap();
        assert_eq!(got, reply);
        assert!(matches!(got.outcome, WorkerOutcome::Err(_)));
    }

    #[tokio::test]
    async fn test_process_launcher_crash_without_reply() {
        let launcher = ProcessLauncher::new(
            "sh",
            vec!["-c".to_string(), "cat > /dev/null; echo dying >&2; exit 3".to_string()],
            ProcessRunner::default(),
        );

        match launcher.launch(request()).await {
            Err(DispatchError::Crashed { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "dying");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_launcher_missing_program() {
        let launcher = ProcessLauncher::new(
            "/nonexistent/mediaforge-worker",
            vec![],
            ProcessRunner::default(),
        );
        assert!(matches!(
            launcher.launch(request()).await,
            Err(DispatchError::Launch(_))
        ));
    }
}
