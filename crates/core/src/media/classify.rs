//! Media kind classification.
//!
//! Still-image decoding answers first because the prober is unreliable on
//! images; stream probing covers everything the decoder cannot identify.

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, ImageFormat, ImageReader, ImageResult};
use std::io::{BufRead, Seek};
use std::path::Path;
use tracing::debug;

use super::kind::MediaKind;
use super::types::StreamCount;

/// Classifies a file by decoding it as a still image.
///
/// Returns `Some(MediaKind::Gif)` when more than one frame decodes,
/// `Some(MediaKind::Image)` for a single frame, and `None` when the decoder
/// cannot identify or read the file. Blocking; run off the async loop.
pub fn decode_still(path: &Path) -> Option<MediaKind> {
    let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    let format = reader.format()?;
    match count_frames(reader, format) {
        Ok(frames) if frames > 1 => {
            debug!(path = %path.display(), ?format, "Animated still image");
            Some(MediaKind::Gif)
        }
        Ok(_) => Some(MediaKind::Image),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Still image decode failed");
            None
        }
    }
}

/// Counts decodable frames, stopping at two.
fn count_frames<R: BufRead + Seek>(reader: ImageReader<R>, format: ImageFormat) -> ImageResult<usize> {
    match format {
        ImageFormat::Gif => {
            let decoder = GifDecoder::new(reader.into_inner())?;
            take_two(decoder)
        }
        ImageFormat::Png => {
            let decoder = PngDecoder::new(reader.into_inner())?;
            if decoder.is_apng()? {
                take_two(decoder.apng()?)
            } else {
                Ok(1)
            }
        }
        ImageFormat::WebP => {
            let decoder = WebPDecoder::new(reader.into_inner())?;
            if decoder.has_animation() {
                take_two(decoder)
            } else {
                Ok(1)
            }
        }
        _ => reader.into_dimensions().map(|_| 1),
    }
}

fn take_two<'a>(decoder: impl AnimationDecoder<'a>) -> ImageResult<usize> {
    let frames = decoder
        .into_frames()
        .take(2)
        .collect::<ImageResult<Vec<_>>>()?;
    Ok(frames.len())
}

/// Classifies probed streams.
///
/// A video stream with one packet (or no reported count) is a still image,
/// even in a container that could animate. Multiple traits resolve as
/// VIDEO, then GIF, then AUDIO, then IMAGE.
pub fn classify_streams(streams: &[StreamCount]) -> MediaKind {
    let (mut video, mut gif, mut audio, mut still) = (false, false, false, false);

    for stream in streams {
        match stream.codec_type.as_str() {
            "audio" => audio = true,
            "video" => match stream.packets {
                Some(n) if n != 1 => {
                    if stream.codec_name.as_deref() == Some("gif") {
                        gif = true;
                    } else {
                        video = true;
                    }
                }
                _ => still = true,
            },
            _ => {}
        }
    }

    if video {
        MediaKind::Video
    } else if gif {
        MediaKind::Gif
    } else if audio {
        MediaKind::Audio
    } else if still {
        MediaKind::Image
    } else {
        MediaKind::Unknown
    }
}
