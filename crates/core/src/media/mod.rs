//! Media inspection and encoder operations.
//!
//! This module provides:
//! - [`MediaKind`] classification (still-image decode first, stream probing
//!   as fallback)
//! - The [`MediaEncoder`] trait: the encoder/prober operations the
//!   orchestrator and transforms need
//! - [`FfmpegEncoder`], the implementation backed by `ffmpeg`/`ffprobe`
//!
//! # Example
//!
//! ```ignore
//! use mediaforge_core::media::{FfmpegEncoder, MediaEncoder, MediaKind};
//!
//! let encoder = FfmpegEncoder::new(config.tools.clone(), config.media.clone());
//! encoder.validate().await?;
//!
//! match encoder.classify(Path::new("/tmp/mediaforge/AbCdEfGh.gif")).await? {
//!     MediaKind::Gif => println!("animated"),
//!     kind => println!("{kind}"),
//! }
//! ```

mod classify;
mod encoder;
mod error;
mod ffmpeg;
mod kind;
mod types;

pub use classify::{classify_streams, decode_still};
pub use encoder::MediaEncoder;
pub use error::MediaError;
pub use ffmpeg::{duration_limit, fit_dimensions, shrink_plan, FfmpegEncoder, ShrinkPlan};
pub use kind::MediaKind;
pub use types::{parse_probe_output, parse_stream_counts, MediaInfo, StreamCount};
