//! Worker request and reply messages.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transform::{TransformError, TransformOutput};

/// One transform invocation for an isolated worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub transform: String,
    pub inputs: Vec<PathBuf>,
    pub args: Vec<String>,
    /// Directory the worker reserves its files in.
    pub temp_dir: PathBuf,
}

/// A transform failure, flattened for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct WorkerFailure {
    pub message: String,
    /// Expected failure to show the user as-is.
    #[serde(default)]
    pub user_facing: bool,
    /// Captured output of a failed external command.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub storage_full: bool,
}

impl WorkerFailure {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_facing: false,
            output: None,
            storage_full: false,
        }
    }
}

impl From<&TransformError> for WorkerFailure {
    fn from(err: &TransformError) -> Self {
        Self {
            message: err.to_string(),
            user_facing: err.is_user(),
            output: err.command_output().map(str::to_string),
            storage_full: err.is_storage_full(),
        }
    }
}

/// Success flag with its value or error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Ok(TransformOutput),
    Err(WorkerFailure),
}

/// Worker answer: outcome plus every path the worker reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub outcome: WorkerOutcome,
    #[serde(default)]
    pub reserved: Vec<PathBuf>,
}

impl WorkerReply {
    pub fn failed(failure: WorkerFailure) -> Self {
        Self {
            outcome: WorkerOutcome::Err(failure),
            reserved: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_wire_shape() {
        let reply = WorkerReply {
            outcome: WorkerOutcome::Ok(TransformOutput::File(PathBuf::from("/t/AbCdEfGh.png"))),
            reserved: vec![PathBuf::from("/t/AbCdEfGh.png")],
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["outcome"]["status"], "ok");
        assert_eq!(json["outcome"]["value"]["type"], "file");
        assert_eq!(json["reserved"][0], "/t/AbCdEfGh.png");
    }

    #[test]
    fn test_failure_from_transform_error() {
        let failure = WorkerFailure::from(&TransformError::user("need two frames"));
        assert!(failure.user_facing);
        assert_eq!(failure.message, "need two frames");
        assert!(!failure.storage_full);
    }
}
