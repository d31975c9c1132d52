//! FFmpeg-based encoder implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::classify::{classify_streams, decode_still};
use super::encoder::MediaEncoder;
use super::error::MediaError;
use super::kind::MediaKind;
use super::types::{parse_probe_output, parse_stream_counts, MediaInfo};
use crate::config::{MediaConfig, ToolsConfig};
use crate::exec::ProcessRunner;
use crate::tempfiles::TempScope;

const SHRINK_AUDIO_KBPS: u64 = 64;

/// Size reduction strategy for one shrink pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShrinkPlan {
    /// Already within target.
    None,
    /// Re-encode at a total bitrate.
    Bitrate { kbps: u64 },
    /// Downscale both dimensions by `factor` (< 1).
    Scale { factor: f64 },
}

/// Computes dimensions that bring `width`x`height` into `[min, max]`.
///
/// Returns `None` when the input already fits. Aspect ratio is kept; the
/// larger side is never pushed past `max` when upscaling. `even` rounds both
/// sides down to even values, as H.264 requires.
pub fn fit_dimensions(width: u32, height: u32, min: u32, max: u32, even: bool) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let (w, h) = (width as f64, height as f64);
    let large = w.max(h);
    let small = w.min(h);

    let factor = if large > max as f64 {
        max as f64 / large
    } else if small < min as f64 {
        (min as f64 / small).min(max as f64 / large)
    } else {
        return None;
    };

    let scale = |side: f64| {
        let v = ((side * factor).round() as u32).max(1);
        if even {
            (v / 2 * 2).max(2)
        } else {
            v
        }
    };
    let fitted = (scale(w), scale(h));
    if fitted == (width, height) {
        None
    } else {
        Some(fitted)
    }
}

/// Computes the length in seconds to trim to, if any limit is exceeded.
pub fn duration_limit(
    duration_secs: Option<f64>,
    fps: Option<f64>,
    frames: Option<u64>,
    max_frames: u64,
    max_duration_secs: Option<f64>,
) -> Option<f64> {
    let mut limit = None;
    if let (Some(frames), Some(fps)) = (frames, fps) {
        if frames > max_frames && fps > 0.0 {
            limit = Some(max_frames as f64 / fps);
        }
    }
    if let (Some(max), Some(duration)) = (max_duration_secs, duration_secs) {
        if duration > max {
            limit = Some(limit.map_or(max, |l: f64| l.min(max)));
        }
    }
    limit
}

/// Chooses a one-shot reduction for a file of `size_bytes`.
pub fn shrink_plan(
    kind: MediaKind,
    size_bytes: u64,
    target_bytes: u64,
    duration_secs: Option<f64>,
) -> ShrinkPlan {
    if size_bytes <= target_bytes || target_bytes == 0 {
        return ShrinkPlan::None;
    }
    let duration = duration_secs.filter(|d| *d > 0.0);
    match (kind, duration) {
        (MediaKind::Video | MediaKind::Audio, Some(duration)) => {
            let kbps = (target_bytes as f64 * 8.0 / duration / 1000.0).floor() as u64;
            ShrinkPlan::Bitrate { kbps: kbps.max(1) }
        }
        (MediaKind::Video | MediaKind::Gif | MediaKind::Image, _) => ShrinkPlan::Scale {
            factor: (target_bytes as f64 / size_bytes as f64).sqrt(),
        },
        _ => ShrinkPlan::None,
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn output_extension(path: &Path, kind: MediaKind) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            match kind {
                MediaKind::Video => "mp4",
                MediaKind::Gif => "gif",
                MediaKind::Audio => "mp3",
                MediaKind::Image | MediaKind::Unknown => "png",
            }
            .to_string()
        })
}

/// Scale filter; GIF output gets a generated palette.
fn scale_filter(width: &str, height: &str, kind: MediaKind) -> String {
    let scale = format!("scale={}:{}:flags=lanczos", width, height);
    if kind == MediaKind::Gif {
        format!("{},split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse", scale)
    } else {
        scale
    }
}

/// FFmpeg-based encoder implementation.
pub struct FfmpegEncoder {
    tools: ToolsConfig,
    media: MediaConfig,
    runner: ProcessRunner,
}

impl FfmpegEncoder {
    /// Creates a new encoder from tool paths and media limits.
    pub fn new(tools: ToolsConfig, media: MediaConfig) -> Self {
        let runner = ProcessRunner::new(tools.niceness);
        Self {
            tools,
            media,
            runner,
        }
    }

    /// Creates an encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ToolsConfig::default(), MediaConfig::default())
    }

    /// Finalizes encoder arguments: quiet banner up front, output size
    /// cap right before the output path.
    fn finish_args(&self, mut args: Vec<String>) -> Vec<String> {
        let mut full = vec!["-hide_banner".to_string(), "-nostdin".to_string()];
        let output = args.pop();
        full.append(&mut args);
        full.extend(["-fs".to_string(), self.media.max_temp_file_size.clone()]);
        full.extend(output);
        full
    }

    fn build_scale_args(
        &self,
        input: &Path,
        output: &Path,
        (width, height): (u32, u32),
        kind: MediaKind,
    ) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-i".to_string(), path_arg(input)];
        args.extend([
            "-vf".to_string(),
            scale_filter(&width.to_string(), &height.to_string(), kind),
        ]);
        if kind == MediaKind::Video {
            args.extend(["-c:a".to_string(), "copy".to_string()]);
        }
        args.push(path_arg(output));
        args
    }

    fn build_trim_args(&self, input: &Path, output: &Path, seconds: f64) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            path_arg(input),
            "-t".to_string(),
            format!("{:.3}", seconds),
            path_arg(output),
        ]
    }

    fn build_reencode_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            path_arg(input),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-vf".to_string(),
            "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-fpsmax".to_string(),
            self.media.max_fps.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            path_arg(output),
        ]
    }

    fn build_shrink_args(
        &self,
        input: &Path,
        output: &Path,
        kind: MediaKind,
        plan: ShrinkPlan,
        has_audio: bool,
    ) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-i".to_string(), path_arg(input)];
        match (plan, kind) {
            (ShrinkPlan::Bitrate { kbps }, MediaKind::Audio) => {
                args.extend([
                    "-c:a".to_string(),
                    "libmp3lame".to_string(),
                    "-b:a".to_string(),
                    format!("{}k", kbps.max(8)),
                ]);
            }
            (ShrinkPlan::Bitrate { kbps }, _) => {
                let audio = if has_audio { SHRINK_AUDIO_KBPS } else { 0 };
                let video = kbps.saturating_sub(audio).max(16);
                args.extend([
                    "-c:v".to_string(),
                    "libx264".to_string(),
                    "-pix_fmt".to_string(),
                    "yuv420p".to_string(),
                    "-b:v".to_string(),
                    format!("{}k", video),
                    "-maxrate".to_string(),
                    format!("{}k", video),
                    "-bufsize".to_string(),
                    format!("{}k", video * 2),
                ]);
                if has_audio {
                    args.extend([
                        "-c:a".to_string(),
                        "aac".to_string(),
                        "-b:a".to_string(),
                        format!("{}k", audio),
                    ]);
                }
            }
            (ShrinkPlan::Scale { factor }, kind) => {
                let (w, h) = if kind == MediaKind::Video {
                    (
                        format!("trunc(iw*{:.4}/2)*2", factor),
                        format!("trunc(ih*{:.4}/2)*2", factor),
                    )
                } else {
                    (format!("iw*{:.4}", factor), format!("ih*{:.4}", factor))
                };
                args.extend(["-vf".to_string(), scale_filter(&w, &h, kind)]);
            }
            (ShrinkPlan::None, _) => {}
        }
        args.push(path_arg(output));
        args
    }

    fn build_gif_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            path_arg(input),
            "-vf".to_string(),
            "split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse".to_string(),
            path_arg(output),
        ]
    }

    async fn run_ffprobe(&self, args: &[&str], path: &Path) -> Result<String, MediaError> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full.push(path_arg(path));
        Ok(self.runner.run(&self.tools.ffprobe_path, full).await?)
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn validate(&self) -> Result<(), MediaError> {
        self.runner.run(&self.tools.ffmpeg_path, ["-version"]).await?;
        self.runner.run(&self.tools.ffprobe_path, ["-version"]).await?;
        Ok(())
    }

    async fn classify(&self, path: &Path) -> Result<MediaKind, MediaError> {
        let owned = path.to_path_buf();
        let still = tokio::task::spawn_blocking(move || decode_still(&owned))
            .await
            .map_err(|e| MediaError::Decode(e.to_string()))?;
        if let Some(kind) = still {
            debug!(path = %path.display(), %kind, "Classified by image decoder");
            return Ok(kind);
        }

        let output = self
            .run_ffprobe(
                &[
                    "-v",
                    "panic",
                    "-count_packets",
                    "-show_entries",
                    "stream=codec_type,codec_name,nb_read_packets",
                    "-print_format",
                    "json",
                ],
                path,
            )
            .await?;
        let kind = classify_streams(&parse_stream_counts(&output)?);
        debug!(path = %path.display(), %kind, "Classified by stream probe");
        Ok(kind)
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        if !path.exists() {
            return Err(MediaError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        let output = self
            .run_ffprobe(
                &[
                    "-v",
                    "quiet",
                    "-count_packets",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                ],
                path,
            )
            .await?;
        parse_probe_output(path, &output)
    }

    async fn is_apng(&self, path: &Path) -> Result<bool, MediaError> {
        #[derive(Deserialize)]
        struct Streams {
            #[serde(default)]
            streams: Vec<Codec>,
        }
        #[derive(Deserialize)]
        struct Codec {
            codec_name: Option<String>,
        }

        let output = self
            .run_ffprobe(
                &[
                    "-v",
                    "panic",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=codec_name",
                    "-print_format",
                    "json",
                ],
                path,
            )
            .await?;
        let parsed: Streams = serde_json::from_str(&output)
            .map_err(|e| MediaError::parse(format!("Failed to parse codec output: {}", e)))?;
        Ok(parsed
            .streams
            .first()
            .and_then(|s| s.codec_name.as_deref())
            == Some("apng"))
    }

    async fn ensure_size(
        &self,
        scope: &mut TempScope,
        path: &Path,
        min: u32,
        max: u32,
    ) -> Result<PathBuf, MediaError> {
        let kind = self.classify(path).await?;
        if !kind.has_pixels() {
            return Ok(path.to_path_buf());
        }
        let info = self.probe(path).await?;
        let Some((width, height)) = info.dimensions() else {
            return Ok(path.to_path_buf());
        };
        let Some(target) = fit_dimensions(width, height, min, max, kind == MediaKind::Video)
        else {
            return Ok(path.to_path_buf());
        };

        info!(
            path = %path.display(),
            from = %format!("{}x{}", width, height),
            to = %format!("{}x{}", target.0, target.1),
            "Resizing input"
        );
        let output = scope.reserve(output_extension(path, kind).as_str());
        let args = self.build_scale_args(path, &output, target, kind);
        self.ffmpeg(args).await?;
        Ok(output)
    }

    async fn ensure_duration(
        &self,
        scope: &mut TempScope,
        path: &Path,
    ) -> Result<PathBuf, MediaError> {
        let kind = self.classify(path).await?;
        if !matches!(kind, MediaKind::Video | MediaKind::Gif | MediaKind::Audio) {
            return Ok(path.to_path_buf());
        }
        let info = self.probe(path).await?;
        let Some(limit) = duration_limit(
            info.duration_secs,
            info.fps,
            info.frame_count,
            self.media.max_frames,
            self.media.max_duration_secs,
        ) else {
            return Ok(path.to_path_buf());
        };

        info!(path = %path.display(), seconds = limit, "Trimming input");
        let output = scope.reserve(output_extension(path, kind).as_str());
        let args = self.build_trim_args(path, &output, limit);
        self.ffmpeg(args).await?;
        Ok(output)
    }

    async fn reencode(&self, scope: &mut TempScope, path: &Path) -> Result<PathBuf, MediaError> {
        let output = scope.reserve("mp4");
        let args = self.build_reencode_args(path, &output);
        self.ffmpeg(args).await?;
        Ok(output)
    }

    async fn shrink(
        &self,
        scope: &mut TempScope,
        path: &Path,
        kind: MediaKind,
        target_bytes: u64,
    ) -> Result<PathBuf, MediaError> {
        let size = tokio::fs::metadata(path).await?.len();
        let info = self.probe(path).await?;
        let plan = shrink_plan(kind, size, target_bytes, info.duration_secs);
        if plan == ShrinkPlan::None {
            return Ok(path.to_path_buf());
        }

        info!(path = %path.display(), size, target_bytes, ?plan, "Shrinking result");
        let extension = match (plan, kind) {
            (ShrinkPlan::Bitrate { .. }, MediaKind::Audio) => "mp3".to_string(),
            (ShrinkPlan::Bitrate { .. }, _) => "mp4".to_string(),
            _ => output_extension(path, kind),
        };
        let output = scope.reserve(extension.as_str());
        let args = self.build_shrink_args(path, &output, kind, plan, info.has_audio());
        self.ffmpeg(args).await?;
        Ok(output)
    }

    async fn mp4_to_gif(&self, scope: &mut TempScope, path: &Path) -> Result<PathBuf, MediaError> {
        let output = scope.reserve("gif");
        let args = self.build_gif_args(path, &output);
        self.ffmpeg(args).await?;
        Ok(output)
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<String, MediaError> {
        let args = self.finish_args(args);
        Ok(self.runner.run(&self.tools.ffmpeg_path, args).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_dimensions_within_bounds() {
        assert_eq!(fit_dimensions(500, 400, 100, 2000, false), None);
        assert_eq!(fit_dimensions(0, 400, 100, 2000, false), None);
    }

    #[test]
    fn test_fit_dimensions_downscale() {
        assert_eq!(fit_dimensions(4000, 2000, 100, 2000, false), Some((2000, 1000)));
    }

    #[test]
    fn test_fit_dimensions_upscale_capped_by_max() {
        assert_eq!(fit_dimensions(50, 25, 100, 2000, false), Some((200, 100)));
        // Extreme aspect ratio: upscaling the short side would overflow max.
        assert_eq!(fit_dimensions(1000, 10, 100, 2000, false), Some((2000, 20)));
    }

    #[test]
    fn test_fit_dimensions_even() {
        assert_eq!(fit_dimensions(4001, 2999, 100, 2000, true), Some((2000, 1498)));
    }

    #[test]
    fn test_duration_limit_frames() {
        let limit = duration_limit(Some(60.0), Some(30.0), Some(1800), 1024, None).unwrap();
        assert!((limit - 1024.0 / 30.0).abs() < 1e-9);
        assert_eq!(duration_limit(Some(10.0), Some(30.0), Some(300), 1024, None), None);
    }

    #[test]
    fn test_duration_limit_seconds() {
        assert_eq!(
            duration_limit(Some(120.0), None, None, 1024, Some(60.0)),
            Some(60.0)
        );
        assert_eq!(
            duration_limit(Some(100.0), Some(10.0), Some(1000), 500, Some(60.0)),
            Some(50.0)
        );
        assert_eq!(duration_limit(None, None, None, 1024, Some(60.0)), None);
    }

    #[test]
    fn test_shrink_plan() {
        assert_eq!(shrink_plan(MediaKind::Video, 100, 200, Some(1.0)), ShrinkPlan::None);
        assert_eq!(
            shrink_plan(MediaKind::Video, 20_000_000, 8_000_000, Some(10.0)),
            ShrinkPlan::Bitrate { kbps: 6400 }
        );
        match shrink_plan(MediaKind::Gif, 16_000_000, 4_000_000, Some(3.0)) {
            ShrinkPlan::Scale { factor } => assert!((factor - 0.5).abs() < 1e-9),
            other => panic!("unexpected plan {:?}", other),
        }
        assert_eq!(shrink_plan(MediaKind::Audio, 20, 10, None), ShrinkPlan::None);
    }

    #[test]
    fn test_finish_args_caps_output_size() {
        let encoder = FfmpegEncoder::with_defaults();
        let args = encoder.finish_args(vec![
            "-y".to_string(),
            "-i".to_string(),
            "in.mp4".to_string(),
            "out.mp4".to_string(),
        ]);
        assert_eq!(args.first().map(String::as_str), Some("-hide_banner"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        let fs = args.iter().position(|a| a == "-fs").unwrap();
        assert_eq!(args[fs + 1], "1G");
        assert_eq!(fs + 2, args.len() - 1);
    }

    #[test]
    fn test_build_reencode_args() {
        let encoder = FfmpegEncoder::with_defaults();
        let args = encoder.build_reencode_args(Path::new("/t/in.webm"), Path::new("/t/out.mp4"));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
        let fps = args.iter().position(|a| a == "-fpsmax").unwrap();
        assert_eq!(args[fps + 1], "100");
    }

    #[test]
    fn test_build_shrink_args_bitrate_reserves_audio() {
        let encoder = FfmpegEncoder::with_defaults();
        let args = encoder.build_shrink_args(
            Path::new("/t/in.mp4"),
            Path::new("/t/out.mp4"),
            MediaKind::Video,
            ShrinkPlan::Bitrate { kbps: 1000 },
            true,
        );
        assert!(args.contains(&"936k".to_string()));
        assert!(args.contains(&"64k".to_string()));
    }

    #[test]
    fn test_build_scale_args_gif_palette() {
        let encoder = FfmpegEncoder::with_defaults();
        let args = encoder.build_scale_args(
            Path::new("/t/in.gif"),
            Path::new("/t/out.gif"),
            (200, 100),
            MediaKind::Gif,
        );
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].starts_with("scale=200:100"));
        assert!(args[vf + 1].contains("paletteuse"));
    }

    #[test]
    fn test_output_extension() {
        assert_eq!(output_extension(Path::new("/t/a.webm"), MediaKind::Video), "webm");
        assert_eq!(output_extension(Path::new("/t/a"), MediaKind::Gif), "gif");
    }
}
