//! Mock encoder for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::exec::CommandError;
use crate::media::{MediaEncoder, MediaError, MediaInfo, MediaKind};
use crate::tempfiles::TempScope;

#[derive(Debug)]
struct State {
    kinds: HashMap<PathBuf, MediaKind>,
    default_kind: MediaKind,
    apng: HashSet<PathBuf>,
    apng_default: bool,
    calls: Vec<String>,
    ffmpeg_calls: Vec<Vec<String>>,
    ffmpeg_failure: Option<String>,
    output_size: u64,
    shrink_size: Option<u64>,
}

/// Mock implementation of the MediaEncoder trait.
///
/// Provides controllable behavior for testing:
/// - Kinds per path, with a fallback for files it wrote itself
/// - Operations that write real files into the caller's scope
/// - Recorded operation names and raw encoder argument lists
/// - Simulated encoder failure with captured output
#[derive(Debug)]
pub struct MockEncoder {
    state: Mutex<State>,
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEncoder {
    /// Create a new mock encoder. Unknown files classify as UNKNOWN.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                kinds: HashMap::new(),
                default_kind: MediaKind::Unknown,
                apng: HashSet::new(),
                apng_default: false,
                calls: Vec::new(),
                ffmpeg_calls: Vec::new(),
                ffmpeg_failure: None,
                output_size: 32,
                shrink_size: None,
            }),
        }
    }

    pub fn with_kind(self, path: impl AsRef<Path>, kind: MediaKind) -> Self {
        self.set_kind(path, kind);
        self
    }

    /// Set the kind reported for a specific path.
    pub fn set_kind(&self, path: impl AsRef<Path>, kind: MediaKind) {
        self.lock().kinds.insert(path.as_ref().to_path_buf(), kind);
    }

    /// Set the kind reported for paths without an explicit kind.
    pub fn set_default_kind(&self, kind: MediaKind) {
        self.lock().default_kind = kind;
    }

    /// Report `path` as an animated PNG.
    pub fn mark_apng(&self, path: impl AsRef<Path>) {
        self.lock().apng.insert(path.as_ref().to_path_buf());
    }

    /// Report every path without an explicit mark as an animated PNG.
    pub fn set_apng_default(&self, apng: bool) {
        self.lock().apng_default = apng;
    }

    /// Bytes written by raw encoder runs and re-encodes.
    pub fn set_output_size(&self, bytes: u64) {
        self.lock().output_size = bytes;
    }

    /// Bytes written by a shrink pass. Defaults to the target size.
    pub fn set_shrink_size(&self, bytes: u64) {
        self.lock().shrink_size = Some(bytes);
    }

    /// Make every raw encoder run fail with this captured output.
    pub fn fail_ffmpeg(&self, output: impl Into<String>) {
        self.lock().ffmpeg_failure = Some(output.into());
    }

    /// Argument lists of every raw encoder run.
    pub fn ffmpeg_calls(&self) -> Vec<Vec<String>> {
        self.lock().ffmpeg_calls.clone()
    }

    /// How many times the named operation ran.
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == operation).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, operation: &str) {
        self.lock().calls.push(operation.to_string());
    }

    fn kind_of(&self, path: &Path) -> MediaKind {
        let state = self.lock();
        state.kinds.get(path).copied().unwrap_or(state.default_kind)
    }

    async fn write_output(
        &self,
        scope: &mut TempScope,
        extension: &str,
        bytes: u64,
    ) -> Result<PathBuf, MediaError> {
        let output = scope.reserve(extension);
        tokio::fs::write(&output, vec![0u8; bytes as usize]).await?;
        Ok(output)
    }
}

#[async_trait]
impl MediaEncoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self) -> Result<(), MediaError> {
        Ok(())
    }

    async fn classify(&self, path: &Path) -> Result<MediaKind, MediaError> {
        self.record("classify");
        Ok(self.kind_of(path))
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        self.record("probe");
        let size_bytes = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        let mut info = MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs: None,
            format: "mock".to_string(),
            video_codec: None,
            width: None,
            height: None,
            fps: None,
            frame_count: None,
            audio_codec: None,
        };
        match self.kind_of(path) {
            MediaKind::Video => {
                info.video_codec = Some("h264".to_string());
                info.audio_codec = Some("aac".to_string());
                info.width = Some(640);
                info.height = Some(360);
                info.fps = Some(30.0);
                info.duration_secs = Some(2.0);
                info.frame_count = Some(60);
            }
            MediaKind::Gif => {
                info.video_codec = Some("gif".to_string());
                info.width = Some(320);
                info.height = Some(240);
                info.fps = Some(10.0);
                info.frame_count = Some(20);
            }
            MediaKind::Image => {
                info.video_codec = Some("png".to_string());
                info.width = Some(320);
                info.height = Some(240);
                info.frame_count = Some(1);
            }
            MediaKind::Audio => {
                info.audio_codec = Some("mp3".to_string());
                info.duration_secs = Some(3.0);
            }
            MediaKind::Unknown => {}
        }
        Ok(info)
    }

    async fn is_apng(&self, path: &Path) -> Result<bool, MediaError> {
        let state = self.lock();
        Ok(state.apng_default || state.apng.contains(path))
    }

    async fn ensure_size(
        &self,
        _scope: &mut TempScope,
        path: &Path,
        _min: u32,
        _max: u32,
    ) -> Result<PathBuf, MediaError> {
        self.record("ensure_size");
        Ok(path.to_path_buf())
    }

    async fn ensure_duration(
        &self,
        _scope: &mut TempScope,
        path: &Path,
    ) -> Result<PathBuf, MediaError> {
        self.record("ensure_duration");
        Ok(path.to_path_buf())
    }

    async fn reencode(&self, scope: &mut TempScope, path: &Path) -> Result<PathBuf, MediaError> {
        self.record("reencode");
        let bytes = tokio::fs::metadata(path).await?.len();
        let output = self.write_output(scope, "mp4", bytes).await?;
        let kind = self.kind_of(path);
        self.set_kind(&output, kind);
        Ok(output)
    }

    async fn shrink(
        &self,
        scope: &mut TempScope,
        path: &Path,
        kind: MediaKind,
        target_bytes: u64,
    ) -> Result<PathBuf, MediaError> {
        self.record("shrink");
        let bytes = self.lock().shrink_size.unwrap_or(target_bytes);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_string();
        let output = self.write_output(scope, &extension, bytes).await?;
        self.set_kind(&output, kind);
        Ok(output)
    }

    async fn mp4_to_gif(&self, scope: &mut TempScope, path: &Path) -> Result<PathBuf, MediaError> {
        self.record("mp4_to_gif");
        let bytes = tokio::fs::metadata(path).await?.len();
        let output = self.write_output(scope, "gif", bytes).await?;
        self.set_kind(&output, MediaKind::Gif);
        Ok(output)
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<String, MediaError> {
        let (failure, bytes) = {
            let mut state = self.lock();
            state.calls.push("ffmpeg".to_string());
            state.ffmpeg_calls.push(args.clone());
            (state.ffmpeg_failure.clone(), state.output_size)
        };
        if let Some(output) = failure {
            return Err(MediaError::Command(CommandError::Failed {
                command: format!("{:?}", args),
                code: Some(1),
                output,
            }));
        }
        let output = args
            .last()
            .ok_or_else(|| MediaError::parse("encoder called without arguments"))?;
        tokio::fs::write(output, vec![0u8; bytes as usize]).await?;
        Ok(String::new())
    }
}
