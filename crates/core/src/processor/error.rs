//! Job error taxonomy.

use thiserror::Error;

use crate::acquire::AcquireError;
use crate::dispatch::{DispatchError, WorkerFailure};
use crate::error::ErrorClass;
use crate::exec::CommandError;
use crate::media::{MediaError, MediaKind};
use crate::tempfiles::ScopeError;
use crate::transform::TransformError;

fn kind_list(kinds: &[MediaKind]) -> String {
    kinds
        .iter()
        .map(MediaKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a job did not complete.
#[derive(Debug, Error)]
pub enum JobError {
    /// Fewer media references than the command needs.
    #[error("No media found; this command needs {required} input(s)")]
    NoMediaFound { required: usize },

    /// An input's kind is not accepted at its position (1-based).
    #[error("Media #{index} is {found}, must be: {}", kind_list(.expected))]
    MediaKindMismatch {
        index: usize,
        found: MediaKind,
        expected: Vec<MediaKind>,
    },

    #[error("Your file is too big ({size} bytes); downloads are limited to {limit} bytes")]
    DownloadTooLarge { size: u64, limit: u64 },

    #[error("Unable to determine the size of {url}")]
    DownloadSizeUnknown { url: String },

    /// An external tool exited non-zero.
    #[error("Command {command} failed")]
    CommandFailed { command: String, output: String },

    /// The transform produced no result where one was expected.
    #[error("Expected {expected}, {transform} returned nothing")]
    ReturnedNothing {
        transform: String,
        expected: &'static str,
    },

    /// Still above the hard ceiling after the shrink pass.
    #[error("Result is too big to send ({size} bytes, limit {limit})")]
    ResultTooLarge { size: u64, limit: u64 },

    /// Network or worker hiccup; worth retrying by hand.
    #[error("{0}")]
    Transient(String),

    /// Expected failure caused by the user's input.
    #[error("{0}")]
    User(String),

    #[error("{0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Temp file scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("Shutting down, not accepting jobs")]
    ShuttingDown,
}

impl JobError {
    /// Who the failure is meant for.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoMediaFound { .. }
            | Self::MediaKindMismatch { .. }
            | Self::DownloadTooLarge { .. }
            | Self::DownloadSizeUnknown { .. }
            | Self::ResultTooLarge { .. }
            | Self::User(_) => ErrorClass::User,
            Self::Transient(_) | Self::ShuttingDown => ErrorClass::Transient,
            Self::CommandFailed { .. }
            | Self::ReturnedNothing { .. }
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Scope(_) => ErrorClass::Bug,
        }
    }

    /// Whether the failure was caused by a full disk.
    pub fn is_storage_full(&self) -> bool {
        match self {
            Self::CommandFailed { output, .. } => output.contains("No space left on device"),
            Self::Io(e) => crate::error::io_is_storage_full(e),
            Self::Scope(ScopeError::Io(e)) => crate::error::io_is_storage_full(e),
            _ => false,
        }
    }

    /// Captured tool output for diagnostics.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Label used for the job outcome metric.
    pub fn metric_label(&self) -> &'static str {
        match self.class() {
            ErrorClass::User => "user_error",
            ErrorClass::Transient => "transient",
            ErrorClass::Bug => "failed",
        }
    }
}

impl From<AcquireError> for JobError {
    fn from(err: AcquireError) -> Self {
        if err.is_transient() {
            return Self::Transient(format!("{}; this is likely temporary, try again", err));
        }
        match err {
            AcquireError::TooLarge { size, limit } => Self::DownloadTooLarge { size, limit },
            AcquireError::SizeUnknown { url } => Self::DownloadSizeUnknown { url },
            AcquireError::Http { .. } => Self::User(err.to_string()),
            AcquireError::Io(e) => Self::Io(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<CommandError> for JobError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Failed {
                command, output, ..
            } => Self::CommandFailed { command, output },
            CommandError::Spawn { source, .. } | CommandError::Wait { source, .. }
                if crate::error::io_is_storage_full(&source) =>
            {
                Self::Io(source)
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MediaError> for JobError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Command(e) => e.into(),
            MediaError::User(message) => Self::User(message),
            MediaError::Io(e) => Self::Io(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TransformError> for JobError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::User(message) => Self::User(message),
            TransformError::Media(e) => e.into(),
            TransformError::Io(e) => Self::Io(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<WorkerFailure> for JobError {
    fn from(failure: WorkerFailure) -> Self {
        if failure.user_facing {
            Self::User(failure.message)
        } else if let Some(output) = failure.output {
            Self::CommandFailed {
                command: failure.message,
                output,
            }
        } else if failure.storage_full {
            Self::Io(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                failure.message,
            ))
        } else {
            Self::Internal(failure.message)
        }
    }
}

impl From<DispatchError> for JobError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Transform(failure) => failure.into(),
            err @ (DispatchError::Launch(_) | DispatchError::Crashed { .. }) => {
                Self::Transient(format!("{}; this is likely temporary, try again", err))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_names_expected_kinds() {
        let err = JobError::MediaKindMismatch {
            index: 1,
            found: MediaKind::Image,
            expected: vec![MediaKind::Video, MediaKind::Gif],
        };
        assert_eq!(err.to_string(), "Media #1 is IMAGE, must be: VIDEO, GIF");
        assert_eq!(err.class(), ErrorClass::User);
    }

    #[test]
    fn test_acquire_errors_map_to_taxonomy() {
        let err: JobError = AcquireError::SizeUnknown {
            url: "https://x/y".into(),
        }
        .into();
        assert!(matches!(err, JobError::DownloadSizeUnknown { .. }));
        assert_eq!(err.class(), ErrorClass::User);

        let err: JobError = AcquireError::TooLarge { size: 10, limit: 5 }.into();
        assert!(matches!(err, JobError::DownloadTooLarge { size: 10, limit: 5 }));
    }

    #[test]
    fn test_command_failure_is_bug_with_output() {
        let err: JobError = MediaError::Command(CommandError::Failed {
            command: "[\"ffmpeg\"]".into(),
            code: Some(1),
            output: "Invalid data found when processing input".into(),
        })
        .into();
        assert_eq!(err.class(), ErrorClass::Bug);
        assert_eq!(
            err.diagnostics(),
            Some("Invalid data found when processing input")
        );
        assert!(!err.is_storage_full());
    }

    #[test]
    fn test_storage_full_detection() {
        let err = JobError::CommandFailed {
            command: "ffmpeg".into(),
            output: "av_interleaved_write_frame(): No space left on device".into(),
        };
        assert!(err.is_storage_full());

        let err: JobError = TransformError::Io(std::io::Error::from_raw_os_error(28)).into();
        assert!(err.is_storage_full());

        let failure = WorkerFailure {
            message: "disk".into(),
            user_facing: false,
            output: None,
            storage_full: true,
        };
        assert!(JobError::from(failure).is_storage_full());
    }

    #[test]
    fn test_worker_failure_mapping() {
        let user = WorkerFailure {
            message: "bad direction".into(),
            user_facing: true,
            output: None,
            storage_full: false,
        };
        assert!(matches!(JobError::from(user), JobError::User(_)));
        let crashed: JobError = DispatchError::Crashed {
            code: Some(139),
            stderr: String::new(),
        }
        .into();
        assert_eq!(crashed.class(), ErrorClass::Transient);

        let launch: JobError = DispatchError::Launch(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "worker stdin closed",
        ))
        .into();
        assert_eq!(launch.class(), ErrorClass::Transient);

        let garbled: JobError = DispatchError::Protocol("not json".into()).into();
        assert_eq!(garbled.class(), ErrorClass::Bug);
    }
}
