pub mod acquire;
pub mod admission;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod media;
pub mod metrics;
pub mod processor;
pub mod tempfiles;
pub mod testing;
pub mod transform;

pub use admission::{AdmissionGate, AdmissionPermit, GateClosed, GateStatus};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, MediaConfig,
    ProcessingConfig, SanitizedConfig, TempConfig, TenorConfig, ToolsConfig,
};
pub use error::ErrorClass;
pub use media::MediaKind;
pub use processor::{JobError, JobReport, JobRequest, MediaProcessor, ProcessorSettings};
pub use tempfiles::{ScopeLease, TempScope, TempStore};
