use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Worker count is not 0 when set
/// - Resize bounds are ordered
/// - Soft output ceiling does not exceed the hard one
/// - Frame and fps limits are positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.processing.workers == Some(0) {
        return Err(ConfigError::ValidationError(
            "processing.workers cannot be 0".to_string(),
        ));
    }

    if config.media.min_size > config.media.max_size {
        return Err(ConfigError::ValidationError(format!(
            "media.min_size ({}) is larger than media.max_size ({})",
            config.media.min_size, config.media.max_size
        )));
    }

    if config.media.max_file_size > config.media.way_too_big_size {
        return Err(ConfigError::ValidationError(format!(
            "media.max_file_size ({}) is larger than media.way_too_big_size ({})",
            config.media.max_file_size, config.media.way_too_big_size
        )));
    }

    if config.media.max_frames == 0 {
        return Err(ConfigError::ValidationError(
            "media.max_frames cannot be 0".to_string(),
        ));
    }

    if config.media.max_fps == 0 {
        return Err(ConfigError::ValidationError(
            "media.max_fps cannot be 0".to_string(),
        ));
    }

    Ok(())
}
