//! The encoder capability used by the orchestrator and transforms.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::MediaError;
use super::kind::MediaKind;
use super::types::MediaInfo;
use crate::tempfiles::TempScope;

/// Encoder and prober operations.
///
/// Every operation that writes a file reserves its output in `scope` before
/// the encoder runs, so a failed invocation never leaks an untracked file.
/// Operations that decide no work is needed return the input path unchanged.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Checks that the external tools are present.
    async fn validate(&self) -> Result<(), MediaError>;

    /// Determines the media kind of a file.
    async fn classify(&self, path: &Path) -> Result<MediaKind, MediaError>;

    /// Probes a file's container and stream properties.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError>;

    /// Whether the first video stream is an animated PNG.
    async fn is_apng(&self, path: &Path) -> Result<bool, MediaError>;

    /// Scales visual media whose width or height falls outside `[min, max]`.
    async fn ensure_size(
        &self,
        scope: &mut TempScope,
        path: &Path,
        min: u32,
        max: u32,
    ) -> Result<PathBuf, MediaError>;

    /// Trims media exceeding the configured frame or duration limits.
    async fn ensure_duration(&self, scope: &mut TempScope, path: &Path)
        -> Result<PathBuf, MediaError>;

    /// Re-encodes video into a broadly playable MP4.
    async fn reencode(&self, scope: &mut TempScope, path: &Path) -> Result<PathBuf, MediaError>;

    /// One reduction pass aiming at `target_bytes`.
    async fn shrink(
        &self,
        scope: &mut TempScope,
        path: &Path,
        kind: MediaKind,
        target_bytes: u64,
    ) -> Result<PathBuf, MediaError>;

    /// Converts an MP4 into a GIF.
    async fn mp4_to_gif(&self, scope: &mut TempScope, path: &Path) -> Result<PathBuf, MediaError>;

    /// Runs the encoder with raw arguments. The last argument is the output.
    async fn ffmpeg(&self, args: Vec<String>) -> Result<String, MediaError>;
}
