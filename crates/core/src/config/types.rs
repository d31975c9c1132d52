use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub temp: TempConfig,
    #[serde(default)]
    pub tenor: Option<TenorConfig>,
}

/// Job admission configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    /// Number of jobs allowed to run their transform at once.
    /// Unset means one per host core.
    #[serde(default)]
    pub workers: Option<usize>,
    /// How many earlier channel messages are searched for media.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: None,
            history_limit: default_history_limit(),
        }
    }
}

impl ProcessingConfig {
    /// Resolves the worker count, falling back to the host core count.
    pub fn resolved_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

fn default_history_limit() -> usize {
    50
}

/// Media size, length and rate limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Inputs smaller than this (width or height) are scaled up.
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    /// Inputs larger than this (width or height) are scaled down.
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Largest declared Content-Length accepted for a download, in bytes.
    #[serde(default = "default_max_download_size")]
    pub max_download_size: u64,
    /// Results above this size get one size-reduction pass.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Results still above this size after reduction are abandoned.
    #[serde(default = "default_way_too_big_size")]
    pub way_too_big_size: u64,
    /// Video and GIF inputs with more frames are trimmed.
    #[serde(default = "default_max_frames")]
    pub max_frames: u64,
    /// Inputs longer than this are trimmed. Unset disables the check.
    #[serde(default)]
    pub max_duration_secs: Option<f64>,
    /// Encoder output size cap (`-fs`), in ffmpeg size syntax.
    #[serde(default = "default_max_temp_file_size")]
    pub max_temp_file_size: String,
    /// Upper bound on output frame rate.
    #[serde(default = "default_max_fps")]
    pub max_fps: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            max_download_size: default_max_download_size(),
            max_file_size: default_max_file_size(),
            way_too_big_size: default_way_too_big_size(),
            max_frames: default_max_frames(),
            max_duration_secs: None,
            max_temp_file_size: default_max_temp_file_size(),
            max_fps: default_max_fps(),
        }
    }
}

fn default_min_size() -> u32 {
    100
}

fn default_max_size() -> u32 {
    2000
}

fn default_max_download_size() -> u64 {
    25_000_000
}

fn default_max_file_size() -> u64 {
    8_388_119
}

fn default_way_too_big_size() -> u64 {
    100_000_000
}

fn default_max_frames() -> u64 {
    1024
}

fn default_max_temp_file_size() -> String {
    "1G".to_string()
}

fn default_max_fps() -> u32 {
    100
}

/// External tool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    /// Scheduling niceness applied to every subprocess (unix only).
    #[serde(default = "default_niceness")]
    pub niceness: Option<i32>,
    /// Executable started for isolated workers. Defaults to the running binary.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            niceness: default_niceness(),
            worker_program: None,
        }
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_niceness() -> Option<i32> {
    Some(10)
}

/// Temp directory configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TempConfig {
    /// Overrides the temp directory. It is wiped at startup.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Tenor API configuration, used to resolve `tenor.com/view` links
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenorConfig {
    pub api_key: String,
    /// Base URL (default: https://tenor.googleapis.com).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub processing: ProcessingConfig,
    pub media: MediaConfig,
    pub tools: ToolsConfig,
    pub temp: TempConfig,
    pub tenor_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            processing: config.processing.clone(),
            media: config.media.clone(),
            tools: config.tools.clone(),
            temp: config.temp.clone(),
            tenor_configured: config
                .tenor
                .as_ref()
                .is_some_and(|t| !t.api_key.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_workers_explicit() {
        let config = ProcessingConfig {
            workers: Some(3),
            ..Default::default()
        };
        assert_eq!(config.resolved_workers(), 3);
    }

    #[test]
    fn test_resolved_workers_defaults_to_cores() {
        let config = ProcessingConfig::default();
        assert!(config.resolved_workers() >= 1);
    }

    #[test]
    fn test_sanitized_config_hides_key() {
        let config = Config {
            tenor: Some(TenorConfig {
                api_key: "secret".to_string(),
                base_url: None,
            }),
            ..Default::default()
        };
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.tenor_configured);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }
}
