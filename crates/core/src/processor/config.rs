//! Settings the processor reads from configuration.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Limits and sizing for [`super::MediaProcessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// Admission gate capacity.
    pub workers: usize,
    /// Channel messages searched for media.
    pub history_limit: usize,
    /// Lower bound for input width/height.
    pub min_size: u32,
    /// Upper bound for input width/height.
    pub max_size: u32,
    /// Results above this many bytes get one shrink pass.
    pub max_file_size: u64,
    /// Results still above this after shrinking are abandoned.
    pub way_too_big_size: u64,
}

impl ProcessorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.processing.resolved_workers(),
            history_limit: config.processing.history_limit,
            min_size: config.media.min_size,
            max_size: config.media.max_size,
            max_file_size: config.media.max_file_size,
            way_too_big_size: config.media.way_too_big_size,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_size_limits(mut self, max_file_size: u64, way_too_big_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self.way_too_big_size = way_too_big_size;
        self
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
