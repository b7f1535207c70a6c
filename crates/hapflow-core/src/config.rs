//! Player configuration
//!
//! All sections deserialize from TOML and fall back to defaults for any
//! missing key, so an empty file is a valid configuration.

use crate::codec::CodecVariant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Upload and hand-off tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Consecutive graphics API failures before playback is reported degraded
    pub degrade_after_failures: u32,
    /// Round backing textures up to powers of two
    pub power_of_two_backing: bool,
    /// Capacity of the session event queue
    pub event_queue_depth: usize,
    /// Window over which the playback framerate is averaged
    pub framerate_sample_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            degrade_after_failures: 3,
            power_of_two_backing: true,
            event_queue_depth: 64,
            framerate_sample_interval_ms: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`)
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl LogConfig {
    /// Parse the configured level, defaulting to INFO if invalid
    pub fn parse_level(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }

    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        if self.file_output {
            std::fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    pub fn current_log_path(&self) -> PathBuf {
        self.log_dir.join("hapflow.log")
    }
}

/// Parameters of the built-in test pattern source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: CodecVariant,
    /// Number of frames to play before exiting, 0 plays until interrupted
    pub frames: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: CodecVariant::Base,
            frames: 300,
        }
    }
}

/// Top-level configuration of the player binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub log: LogConfig,
    pub stream: StreamConfig,
    pub playback: PlaybackConfig,
}

impl PlayerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.degrade_after_failures == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.degrade_after_failures",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.stream.event_queue_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "stream.event_queue_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.playback.fps.is_finite() && self.playback.fps > 0.0) {
            return Err(ConfigError::Invalid {
                field: "playback.fps",
                reason: format!("{} is not a positive frame rate", self.playback.fps),
            });
        }
        Ok(())
    }
}
