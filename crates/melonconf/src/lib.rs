//! Configuration loading for the melonDS session controller.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): paths and logging. Fixed once the
//!   session is up.
//!
//! - **Emulator** (`EmulatorConfig`): firmware mode, console variant, audio,
//!   microphone and rewind settings. Handed to `configure`, and parts of it
//!   (audio, microphone, rewind) can be re-applied live.
//!
//! # Usage
//!
//! ```rust,no_run
//! use melonconf::MelonConfig;
//!
//! let config = MelonConfig::load().expect("Failed to load config");
//! println!("config dir: {}", config.infra.paths.config_dir.display());
//! println!("volume: {}", config.emulator.audio.volume);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, merged key by key):
//! 1. `/etc/melonds/config.toml` (system)
//! 2. `~/.config/melonds/config.toml` (user)
//! 3. `./melonds.toml` or an explicit path (local override)
//! 4. Environment variables (`MELONDS_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! config_dir = "~/.config/melonds"
//! savestate_dir = "~/saves"
//!
//! [telemetry]
//! log_level = "info,melonsession=debug"
//!
//! [emulator]
//! console = "ds"
//! mic_source = "host_microphone"
//!
//! [emulator.firmware]
//! mode = "external"
//! bios7 = "~/bios/bios7.bin"
//! bios9 = "~/bios/bios9.bin"
//! firmware = "~/bios/firmware.bin"
//!
//! [emulator.audio]
//! volume = 256
//! latency = "low_latency"
//!
//! [emulator.rewind]
//! enabled = true
//! period_seconds = 10
//! window_seconds = 300
//! ```

pub mod emulator;
pub mod infra;
pub mod loader;

pub use emulator::{
    AudioConfig, ConsoleType, DsiPaths, EmulatorConfig, FirmwareConfig, FirmwareLanguage,
    InternalFirmware, LatencyClass, MicSource, RewindConfig, MAX_VOLUME,
};
pub use infra::{InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MelonConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(default)]
    pub emulator: EmulatorConfig,
}

impl MelonConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit override file, then apply env overrides.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;
        loader::expand_config_paths(&mut config);

        loader::apply_env_overrides(&mut config, &mut sources);
        config.emulator.validate()?;

        Ok((config, sources))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::from("# melonDS session configuration\n\n");
        match toml::to_string_pretty(self) {
            Ok(body) => output.push_str(&body),
            Err(e) => output.push_str(&format!("# failed to render config: {e}\n")),
        }
        output
    }
}
