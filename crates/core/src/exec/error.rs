//! Error types for external processes.

use thiserror::Error;

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The binary could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero.
    #[error("Command {command} failed with exit code {code:?}")]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// Waiting on the child failed.
    #[error("I/O error while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Captured output of a failed command.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Whether the failure was caused by a full disk.
    pub fn is_storage_full(&self) -> bool {
        match self {
            Self::Failed { output, .. } => output.contains("No space left on device"),
            Self::Spawn { source, .. } | Self::Wait { source, .. } => {
                crate::error::io_is_storage_full(source)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_output() {
        let err = CommandError::Failed {
            command: "ffmpeg -i in.mp4".to_string(),
            code: Some(1),
            output: "in.mp4: Invalid data found when processing input".to_string(),
        };
        assert!(err.output().unwrap().contains("Invalid data"));
        assert!(!err.is_storage_full());
        assert!(err.to_string().contains("exit code Some(1)"));
    }

    #[test]
    fn test_storage_full_from_output() {
        let err = CommandError::Failed {
            command: "ffmpeg".to_string(),
            code: Some(1),
            output: "av_interleaved_write_frame(): No space left on device".to_string(),
        };
        assert!(err.is_storage_full());
    }
}
