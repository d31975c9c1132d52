//! Transform capability.
//!
//! A transform maps input files plus arguments to an output file or status
//! text. Async transforms run on the event loop and may drive the encoder;
//! sync transforms are CPU-bound and are run either inline or in an
//! isolated worker, as the caller decides.

mod builtin;

pub use builtin::{sync_registry, InfoTransform, MirrorTransform, ReverseTransform};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::media::{MediaEncoder, MediaError};
use crate::tempfiles::TempScope;

/// What a transform produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TransformOutput {
    File(PathBuf),
    Text(String),
    Nothing,
}

/// Errors raised by transform bodies.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Bad input or arguments; shown to the user as-is.
    #[error("{0}")]
    User(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

impl TransformError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Whether this is an expected, user-caused failure.
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_) | Self::Media(MediaError::User(_)))
    }

    /// Captured output of a failed external command, if that is the cause.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::Media(MediaError::Command(e)) => e.output(),
            _ => None,
        }
    }

    pub fn is_storage_full(&self) -> bool {
        match self {
            Self::Media(e) => e.is_storage_full(),
            Self::Io(e) => crate::error::io_is_storage_full(e),
            _ => false,
        }
    }
}

/// Where a sync transform runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// On the calling task; blocks the event loop.
    #[default]
    Inline,
    /// In a freshly launched worker process.
    Isolated,
}

/// Handles an async transform may use.
pub struct TransformContext<'a> {
    /// Scope owning every file the transform reserves.
    pub scope: &'a mut TempScope,
    pub encoder: &'a dyn MediaEncoder,
}

/// A transform that cooperates with the event loop.
#[async_trait]
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        inputs: &[PathBuf],
        args: &[String],
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutput, TransformError>;
}

/// A blocking, CPU-bound transform.
pub trait SyncTransform: Send + Sync {
    fn name(&self) -> &str;

    fn run(
        &self,
        inputs: &[PathBuf],
        args: &[String],
        scope: &mut TempScope,
    ) -> Result<TransformOutput, TransformError>;
}

/// Sync transforms by name, for isolated workers to look up.
#[derive(Default, Clone)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Arc<dyn SyncTransform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, transform: Arc<dyn SyncTransform>) -> Self {
        self.transforms
            .insert(transform.name().to_string(), transform);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SyncTransform>> {
        self.transforms.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandError;

    #[test]
    fn test_output_serde_shape() {
        let json = serde_json::to_string(&TransformOutput::Text("hi".into())).unwrap();
        assert_eq!(json, r#"{"type":"text","value":"hi"}"#);
        let back: TransformOutput = serde_json::from_str(r#"{"type":"nothing"}"#).unwrap();
        assert_eq!(back, TransformOutput::Nothing);
    }

    #[test]
    fn test_error_classification() {
        assert!(TransformError::user("bad arg").is_user());
        assert!(TransformError::Media(MediaError::User("too short".into())).is_user());

        let failed = TransformError::Media(MediaError::Command(CommandError::Failed {
            command: "ffmpeg".into(),
            code: Some(1),
            output: "No space left on device".into(),
        }));
        assert!(!failed.is_user());
        assert!(failed.is_storage_full());
        assert_eq!(failed.command_output(), Some("No space left on device"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TransformRegistry::new().register(Arc::new(MirrorTransform));
        assert!(registry.get("mirror").is_some());
        assert!(registry.get("reverse").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["mirror"]);
    }
}
