//! Probe result types and ffprobe JSON parsing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::MediaError;

/// Properties of a media file as reported by the prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Path to the file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Duration in seconds, when the container reports one.
    pub duration_secs: Option<f64>,
    /// Container format (e.g., "mov", "gif", "png_pipe").
    pub format: String,
    /// First video stream codec.
    pub video_codec: Option<String>,
    /// Display width (rotation applied).
    pub width: Option<u32>,
    /// Display height (rotation applied).
    pub height: Option<u32>,
    /// Frame rate of the first video stream.
    pub fps: Option<f64>,
    /// Frame count of the first video stream, when known.
    pub frame_count: Option<u64>,
    /// First audio stream codec.
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    /// Width and height, if the file has a video stream with known dimensions.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}

/// Per-stream packet count used for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCount {
    pub codec_type: String,
    pub codec_name: Option<String>,
    /// Decodable packets. `None` when the prober did not report a count.
    pub packets: Option<u64>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    fn rotation(&self) -> Option<f64> {
        self.tags
            .as_ref()
            .and_then(|t| t.rotate.as_ref())
            .and_then(|r| r.parse::<f64>().ok())
            .or_else(|| self.side_data_list.iter().find_map(|s| s.rotation))
    }
}

fn parse_json(output: &str) -> Result<ProbeOutput, MediaError> {
    serde_json::from_str(output)
        .map_err(|e| MediaError::parse(format!("Failed to parse ffprobe output: {}", e)))
}

/// Parses a frame rate like "24000/1001" or "30".
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().ok()?;
            let den = den.parse::<f64>().ok()?;
            if den > 0.0 && num > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => rate.parse::<f64>().ok().filter(|r| *r > 0.0),
    }
}

/// Parses `ffprobe -show_format -show_streams -print_format json` output.
pub fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, MediaError> {
    let probe = parse_json(output)?;

    let format = probe.format.as_ref();
    let duration_secs = format
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok());
    let size_bytes = format
        .and_then(|f| f.size.as_ref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let format_name = format
        .and_then(|f| f.format_name.as_deref())
        .and_then(|f| f.split(',').next())
        .unwrap_or("unknown");

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let (mut width, mut height) = (video.and_then(|s| s.width), video.and_then(|s| s.height));
    // Rotated by a quarter turn: display dimensions are swapped.
    if let Some(rot) = video.and_then(|s| s.rotation()) {
        if rot % 90.0 == 0.0 && rot % 180.0 != 0.0 {
            std::mem::swap(&mut width, &mut height);
        }
    }

    Ok(MediaInfo {
        path: path.to_path_buf(),
        size_bytes,
        duration_secs,
        format: format_name.to_string(),
        video_codec: video.and_then(|s| s.codec_name.clone()),
        width,
        height,
        fps: video
            .and_then(|s| s.r_frame_rate.as_deref())
            .and_then(parse_rate),
        frame_count: video.and_then(|s| {
            s.nb_read_packets
                .as_deref()
                .or(s.nb_frames.as_deref())
                .and_then(|n| n.parse::<u64>().ok())
        }),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
    })
}

/// Parses `ffprobe -count_packets -show_entries stream=codec_type,codec_name,nb_read_packets`.
pub fn parse_stream_counts(output: &str) -> Result<Vec<StreamCount>, MediaError> {
    let probe = parse_json(output)?;
    Ok(probe
        .streams
        .into_iter()
        .filter_map(|s| {
            Some(StreamCount {
                codec_type: s.codec_type?,
                codec_name: s.codec_name,
                packets: s.nb_read_packets.and_then(|n| n.parse::<u64>().ok()),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_PROBE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30000/1001", "nb_frames": "300",
             "tags": {"rotate": "90"}},
            {"codec_type": "audio", "codec_name": "aac"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.010000", "size": "123456"}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(Path::new("/tmp/a.mp4"), VIDEO_PROBE).unwrap();
        assert_eq!(info.format, "mov");
        assert_eq!(info.size_bytes, 123456);
        assert_eq!(info.duration_secs, Some(10.01));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
        assert_eq!(info.frame_count, Some(300));
        assert!((info.fps.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let info = parse_probe_output(Path::new("/tmp/a.mp4"), VIDEO_PROBE).unwrap();
        assert_eq!(info.dimensions(), Some((1080, 1920)));
    }

    #[test]
    fn test_side_data_rotation() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "hevc",
            "width": 640, "height": 480, "side_data_list": [{"rotation": -90}]}]}"#;
        let info = parse_probe_output(Path::new("/tmp/a.mov"), json).unwrap();
        assert_eq!(info.dimensions(), Some((480, 640)));
        assert!(info.duration_secs.is_none());
        assert_eq!(info.format, "unknown");
    }

    #[test]
    fn test_half_turn_keeps_dimensions() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "h264",
            "width": 640, "height": 480, "tags": {"rotate": "180"}}]}"#;
        let info = parse_probe_output(Path::new("/tmp/a.mp4"), json).unwrap();
        assert_eq!(info.dimensions(), Some((640, 480)));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_stream_counts() {
        let json = r#"{"programs": [], "streams": [
            {"codec_name": "gif", "codec_type": "video", "nb_read_packets": "12"},
            {"codec_name": "mp3", "codec_type": "audio", "nb_read_packets": "400"},
            {"codec_name": "png", "codec_type": "video"}
        ]}"#;
        let streams = parse_stream_counts(json).unwrap();
        assert_eq!(streams.len(), 3);
        assert_eq!(streams[0].packets, Some(12));
        assert_eq!(streams[1].codec_type, "audio");
        assert_eq!(streams[2].packets, None);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(matches!(
            parse_stream_counts("not json"),
            Err(MediaError::ParseError { .. })
        ));
    }
}
