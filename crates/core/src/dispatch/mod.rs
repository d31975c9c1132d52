//! Parallel execution dispatcher.
//!
//! Sync transforms marked for isolation run in a freshly launched worker
//! process so a crash or hang cannot take the event loop with it. The
//! worker reserves files in the same temp directory under its own scope
//! and reports them back; the dispatcher adopts them into the caller's
//! scope on success and failure alike.
//!
//! # Protocol
//!
//! The worker reads one JSON [`WorkerRequest`] from stdin until EOF and
//! writes one JSON [`WorkerReply`] line to stdout. Logs go to stderr.

mod dispatcher;
mod launcher;
mod protocol;
mod worker;

pub use dispatcher::ParallelDispatcher;
pub use launcher::{InProcessLauncher, ProcessLauncher, WorkerLauncher};
pub use protocol::{WorkerFailure, WorkerOutcome, WorkerReply, WorkerRequest};
pub use worker::{execute_request, serve_worker};

use thiserror::Error;

/// Errors from dispatching to an isolated worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker could not be started or talked to.
    #[error("Failed to launch worker: {0}")]
    Launch(#[source] std::io::Error),

    /// The worker exited without a readable reply.
    #[error("Worker exited with code {code:?} without a reply: {stderr}")]
    Crashed { code: Option<i32>, stderr: String },

    /// The reply could not be parsed.
    #[error("Malformed worker reply: {0}")]
    Protocol(String),

    /// The transform itself failed inside the worker.
    #[error("{0}")]
    Transform(WorkerFailure),
}
