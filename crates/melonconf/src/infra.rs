//! Infrastructure configuration - things that cannot change once a session is up.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem locations used by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding firmware user settings and internal firmware data.
    /// Default: ~/.config/melonds
    #[serde(default = "PathsConfig::default_config_dir")]
    pub config_dir: PathBuf,

    /// Directory for savestate slot files. When unset, slots are written
    /// next to the ROM they belong to.
    #[serde(default)]
    pub savestate_dir: Option<PathBuf>,
}

impl PathsConfig {
    fn default_config_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("melonds"))
            .unwrap_or_else(|| PathBuf::from(".config/melonds"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: Self::default_config_dir(),
            savestate_dir: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Tracing filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` expression).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Infrastructure configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
