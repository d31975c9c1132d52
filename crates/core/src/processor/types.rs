//! Job requests, options, delivery and reports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::error::JobError;
use crate::media::MediaKind;
use crate::transform::{ExecutionMode, SyncTransform, Transform};

/// Per-job switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessOptions {
    /// Scale inputs into the configured dimension bounds first.
    pub resize: bool,
    /// The transform must produce a file.
    pub expect_result: bool,
    /// Hand the produced file to the delivery collaborator.
    pub deliver_result: bool,
    /// Wait for an admission slot before running.
    pub queue: bool,
    /// Where a sync transform runs.
    pub mode: ExecutionMode,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            resize: true,
            expect_result: true,
            deliver_result: true,
            queue: true,
            mode: ExecutionMode::Inline,
        }
    }
}

impl ProcessOptions {
    pub fn with_resize(mut self, resize: bool) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_expect_result(mut self, expect_result: bool) -> Self {
        self.expect_result = expect_result;
        self
    }

    pub fn with_deliver_result(mut self, deliver_result: bool) -> Self {
        self.deliver_result = deliver_result;
        self
    }

    pub fn with_queue(mut self, queue: bool) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// The transform a job runs.
#[derive(Clone)]
pub enum JobTransform {
    Async(Arc<dyn Transform>),
    Sync(Arc<dyn SyncTransform>),
}

impl JobTransform {
    pub fn name(&self) -> &str {
        match self {
            Self::Async(t) => t.name(),
            Self::Sync(t) => t.name(),
        }
    }
}

impl std::fmt::Debug for JobTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Async(t) => f.debug_tuple("Async").field(&t.name()).finish(),
            Self::Sync(t) => f.debug_tuple("Sync").field(&t.name()).finish(),
        }
    }
}

/// One command invocation.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub transform: JobTransform,
    /// Accepted kinds per input position. Empty means no inputs.
    pub inputs: Vec<Vec<MediaKind>>,
    pub args: Vec<String>,
    pub options: ProcessOptions,
}

impl JobRequest {
    pub fn asynchronous(transform: Arc<dyn Transform>) -> Self {
        Self::new(JobTransform::Async(transform))
    }

    pub fn synchronous(transform: Arc<dyn SyncTransform>) -> Self {
        Self::new(JobTransform::Sync(transform))
    }

    fn new(transform: JobTransform) -> Self {
        Self {
            transform,
            inputs: Vec::new(),
            args: Vec::new(),
            options: ProcessOptions::default(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<Vec<MediaKind>>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }
}

/// Progress shown to the user while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Downloading,
    Queued,
    Processing,
    Uploading,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Downloading => "Downloading...",
            Self::Queued => "Your command is in the queue...",
            Self::Processing => "Processing...",
            Self::Uploading => "Uploading...",
        };
        f.write_str(text)
    }
}

/// A result handed to the delivery collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact<'a> {
    File(&'a Path),
    Text(&'a str),
}

/// Where progress and results go.
///
/// The processor never inspects what delivery did with an artifact.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Shows a progress status.
    async fn notify(&self, status: JobStatus);

    /// Sends a finished result.
    async fn deliver(&self, artifact: Artifact<'_>);

    /// Sends an informational message that does not end the job.
    async fn notice(&self, _message: &str) {}
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JobOutcome {
    /// A file of this size.
    File { bytes: u64 },
    Text(String),
}

/// Summary of one [`super::MediaProcessor::run`] call.
#[derive(Debug)]
pub struct JobReport {
    pub job_id: Uuid,
    pub transform: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub input_kinds: Vec<MediaKind>,
    /// Files deleted when the scope closed.
    pub temp_files_removed: usize,
    /// Whether a shrink pass was applied to the result.
    pub remediated: bool,
    /// Whether an artifact was handed to delivery.
    pub delivered: bool,
    pub outcome: Result<JobOutcome, JobError>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{MirrorTransform, ReverseTransform};

    #[test]
    fn test_default_options() {
        let options = ProcessOptions::default();
        assert!(options.resize && options.expect_result && options.deliver_result);
        assert!(options.queue);
        assert_eq!(options.mode, ExecutionMode::Inline);
    }

    #[test]
    fn test_request_builders() {
        let job = JobRequest::synchronous(Arc::new(MirrorTransform))
            .with_inputs(vec![MediaKind::VISUAL.to_vec()])
            .with_args(vec!["vertical".into()])
            .with_options(ProcessOptions::default().with_mode(ExecutionMode::Isolated));
        assert_eq!(job.transform.name(), "mirror");
        assert!(matches!(job.transform, JobTransform::Sync(_)));
        assert_eq!(job.inputs.len(), 1);
        assert_eq!(job.options.mode, ExecutionMode::Isolated);

        let job = JobRequest::asynchronous(Arc::new(ReverseTransform));
        assert!(job.inputs.is_empty());
        assert_eq!(format!("{:?}", job.transform), "Async(\"reverse\")");
    }

    #[test]
    fn test_status_text() {
        assert_eq!(JobStatus::Queued.to_string(), "Your command is in the queue...");
        assert_eq!(JobStatus::Processing.to_string(), "Processing...");
    }

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_value(JobOutcome::File { bytes: 12 }).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["value"]["bytes"], 12);
    }
}
