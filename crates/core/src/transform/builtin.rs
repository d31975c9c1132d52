//! Built-in transforms.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{SyncTransform, Transform, TransformContext, TransformError, TransformOutput, TransformRegistry};
use crate::media::MediaKind;
use crate::tempfiles::TempScope;

fn single_input(inputs: &[PathBuf]) -> Result<&Path, TransformError> {
    inputs
        .first()
        .map(PathBuf::as_path)
        .ok_or_else(|| TransformError::Failed("transform called without an input".to_string()))
}

/// Plays media backwards.
pub struct ReverseTransform;

#[async_trait]
impl Transform for ReverseTransform {
    fn name(&self) -> &str {
        "reverse"
    }

    async fn run(
        &self,
        inputs: &[PathBuf],
        _args: &[String],
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutput, TransformError> {
        let input = single_input(inputs)?;
        let info = ctx.encoder.probe(input).await?;
        let kind = ctx.encoder.classify(input).await?;

        let extension = match kind {
            MediaKind::Gif => "gif",
            MediaKind::Audio => "mp3",
            _ => "mp4",
        };
        let output = ctx.scope.reserve(extension);

        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];
        if info.has_video() && kind != MediaKind::Audio {
            args.extend(["-vf".to_string(), "reverse".to_string()]);
        }
        if info.has_audio() {
            args.extend(["-af".to_string(), "areverse".to_string()]);
        }
        args.push(output.to_string_lossy().to_string());

        ctx.encoder.ffmpeg(args).await?;
        Ok(TransformOutput::File(output))
    }
}

/// Describes a file as status text.
pub struct InfoTransform;

#[async_trait]
impl Transform for InfoTransform {
    fn name(&self) -> &str {
        "info"
    }

    async fn run(
        &self,
        inputs: &[PathBuf],
        _args: &[String],
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutput, TransformError> {
        let input = single_input(inputs)?;
        let kind = ctx.encoder.classify(input).await?;
        let info = ctx.encoder.probe(input).await?;

        let mut lines = vec![
            format!("Type: {}", kind),
            format!("Container: {}", info.format),
            format!("Size: {} bytes", info.size_bytes),
        ];
        if let Some((w, h)) = info.dimensions() {
            lines.push(format!("Resolution: {}x{}", w, h));
        }
        if let Some(duration) = info.duration_secs {
            lines.push(format!("Duration: {:.2}s", duration));
        }
        if let Some(fps) = info.fps {
            lines.push(format!("Frame rate: {:.2}", fps));
        }
        if let Some(codec) = &info.video_codec {
            lines.push(format!("Video codec: {}", codec));
        }
        if let Some(codec) = &info.audio_codec {
            lines.push(format!("Audio codec: {}", codec));
        }
        Ok(TransformOutput::Text(lines.join("\n")))
    }
}

/// Flips an image horizontally, or vertically with the `vertical` argument.
pub struct MirrorTransform;

impl SyncTransform for MirrorTransform {
    fn name(&self) -> &str {
        "mirror"
    }

    fn run(
        &self,
        inputs: &[PathBuf],
        args: &[String],
        scope: &mut TempScope,
    ) -> Result<TransformOutput, TransformError> {
        let input = single_input(inputs)?;
        let vertical = match args.first().map(String::as_str) {
            None | Some("horizontal") => false,
            Some("vertical") => true,
            Some(other) => {
                return Err(TransformError::user(format!(
                    "Unknown direction '{}', expected horizontal or vertical",
                    other
                )))
            }
        };

        let image = image::open(input)?;
        let flipped = if vertical { image.flipv() } else { image.fliph() };

        let output = scope.reserve("png");
        flipped.save(&output)?;
        Ok(TransformOutput::File(output))
    }
}

/// Registry of the sync transforms an isolated worker can run.
pub fn sync_registry() -> TransformRegistry {
    TransformRegistry::new().register(Arc::new(MirrorTransform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempfiles::{ScopeLease, TempStore};
    use crate::testing::MockEncoder;
    use image::{GenericImageView, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn two_tone(path: &Path) {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_mirror_horizontal() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();
        let input = dir.path().join("in.png");
        two_tone(&input);

        let out = MirrorTransform
            .run(&[input], &[], &mut scope)
            .unwrap();
        let TransformOutput::File(path) = out else {
            panic!("expected a file");
        };
        assert!(scope.owns(&path));
        let flipped = image::open(&path).unwrap();
        assert_eq!(flipped.get_pixel(1, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(flipped.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_mirror_vertical() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();
        let input = dir.path().join("in.png");
        two_tone(&input);

        let out = MirrorTransform
            .run(&[input], &["vertical".to_string()], &mut scope)
            .unwrap();
        let TransformOutput::File(path) = out else {
            panic!("expected a file");
        };
        assert_eq!(image::open(&path).unwrap().get_pixel(0, 1), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_mirror_rejects_bad_direction() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();
        let input = dir.path().join("in.png");
        two_tone(&input);

        let err = MirrorTransform
            .run(&[input], &["diagonal".to_string()], &mut scope)
            .unwrap_err();
        assert!(err.is_user());
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn test_reverse_builds_filters_from_streams() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"video").unwrap();
        let encoder = MockEncoder::new().with_kind(&input, MediaKind::Video);

        let mut ctx = TransformContext {
            scope: &mut scope,
            encoder: &encoder,
        };
        let out = ReverseTransform.run(&[input], &[], &mut ctx).await.unwrap();

        let TransformOutput::File(path) = out else {
            panic!("expected a file");
        };
        assert_eq!(path.extension().unwrap(), "mp4");
        let calls = encoder.ffmpeg_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains(&"reverse".to_string()));
        assert!(calls[0].contains(&"areverse".to_string()));
    }

    #[tokio::test]
    async fn test_info_reports_text() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::attach(dir.path());
        let lease = ScopeLease::new();
        let mut scope = store.open_scope(&lease).unwrap();
        let input = dir.path().join("pic.png");
        std::fs::write(&input, b"png").unwrap();
        let encoder = MockEncoder::new().with_kind(&input, MediaKind::Image);

        let mut ctx = TransformContext {
            scope: &mut scope,
            encoder: &encoder,
        };
        let out = InfoTransform.run(&[input], &[], &mut ctx).await.unwrap();
        let TransformOutput::Text(text) = out else {
            panic!("expected text");
        };
        assert!(text.starts_with("Type: IMAGE"));
        assert!(scope.is_empty());
    }
}
