//! External process execution.
//!
//! Encoder, prober and worker binaries all run through [`ProcessRunner`]:
//! reduced scheduling priority, stdout and stderr captured, non-zero exit
//! surfaced as [`CommandError::Failed`] with the captured output.

mod error;
mod runner;

pub use error::CommandError;
pub use runner::{decode_output, ProcessRunner};
