//! Error types for media inspection and encoding.

use std::path::PathBuf;
use thiserror::Error;

use crate::exec::CommandError;

/// Errors that can occur while inspecting or encoding media.
#[derive(Debug, Error)]
pub enum MediaError {
    /// An encoder or prober invocation failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The file does not exist.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Prober output could not be understood.
    #[error("Failed to parse probe output: {reason}")]
    ParseError { reason: String },

    /// The file has no stream the operation needs.
    #[error("{path} has no {stream} stream")]
    MissingStream { path: PathBuf, stream: &'static str },

    /// Expected failure worth showing to the user.
    #[error("{0}")]
    User(String),

    /// I/O error while inspecting media.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking decode task failed.
    #[error("Decode task failed: {0}")]
    Decode(String),
}

impl MediaError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ParseError {
            reason: reason.into(),
        }
    }

    /// Whether the failure was caused by a full disk.
    pub fn is_storage_full(&self) -> bool {
        match self {
            Self::Command(e) => e.is_storage_full(),
            Self::Io(e) => crate::error::io_is_storage_full(e),
            _ => false,
        }
    }
}
