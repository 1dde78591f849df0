//! Config loading and persistence.

mod load;
mod merge;
mod schema;

use std::path::PathBuf;

use thiserror::Error;

use crate::core::{Effect, Transience};

pub use load::{
    config_path, load, load_from, load_or_default, load_project_config, load_user_config,
    project_config_path, write_config,
};
pub use merge::{apply_env_overrides, apply_env_overrides_with, merge_layers};
pub use schema::{
    BrushConfig, BrushConfigOverride, CanvasConfig, CanvasConfigOverride, Config, ConfigLayer,
    FileLoggingConfig, FileLoggingConfigOverride, LogFormat, LogRotation, LoggingConfig,
    LoggingConfigOverride, ReplicationConfig, ReplicationConfigOverride,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
    #[error("invalid config {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn transience(&self) -> Transience {
        match self {
            ConfigError::Read { .. } | ConfigError::Write { .. } => Transience::Unknown,
            ConfigError::Parse { .. } | ConfigError::Render(_) | ConfigError::Invalid { .. } => {
                Transience::Permanent
            }
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            // A failed persist may leave the temp file behind.
            ConfigError::Write { .. } => Effect::Unknown,
            _ => Effect::None,
        }
    }
}
