//! Processing orchestrator.
//!
//! [`MediaProcessor`] drives one command end to end:
//! - Opens a temp file scope for the whole call
//! - Locates, downloads and classifies inputs, rejecting wrong kinds before
//!   any queuing happens
//! - Waits for an admission slot, then trims inputs and runs the transform
//!   (async, inline, or in an isolated worker)
//! - Normalizes the result (video re-encode, one-shot size remediation)
//! - Hands the result to the delivery collaborator and closes the scope
//!
//! # Example
//!
//! ```ignore
//! use mediaforge_core::processor::{JobRequest, MediaProcessor, ProcessorSettings};
//! use mediaforge_core::media::MediaKind;
//!
//! let processor = MediaProcessor::new(settings, store, encoder, fetcher, resolver);
//!
//! let job = JobRequest::asynchronous(Arc::new(ReverseTransform))
//!     .with_inputs(vec![vec![MediaKind::Video, MediaKind::Gif]]);
//! let report = processor.run(&chat, &delivery, job).await;
//! if let Err(e) = &report.outcome {
//!     println!("{} failed: {}", report.job_id, e);
//! }
//! ```

mod config;
mod error;
mod pipeline;
mod types;

pub use config::ProcessorSettings;
pub use error::JobError;
pub use pipeline::MediaProcessor;
pub use types::{
    Artifact, Delivery, JobOutcome, JobReport, JobRequest, JobStatus, JobTransform,
    ProcessOptions,
};
