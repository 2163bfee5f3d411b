//! Emulator configuration - seeds a session at `configure` time and can be
//! re-applied live through `update_configuration`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::ConfigError;

/// Highest volume accepted by the sound output (unity gain).
pub const MAX_VOLUME: u16 = 256;

/// Console variant the core emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleType {
    #[default]
    Ds,
    Dsi,
}

impl ConsoleType {
    /// Whether the console exposes the Slot-2 (GBA) cartridge slot.
    pub fn supports_gba_slot(self) -> bool {
        matches!(self, ConsoleType::Ds)
    }

    /// Whether a NAND image must be prepared before a cartridge can boot.
    pub fn requires_nand(self) -> bool {
        matches!(self, ConsoleType::Dsi)
    }
}

impl FromStr for ConsoleType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ds" => Ok(ConsoleType::Ds),
            "dsi" => Ok(ConsoleType::Dsi),
            other => Err(ConfigError::Invalid(format!("unknown console type: {other}"))),
        }
    }
}

/// Firmware language, in the order the DS firmware stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareLanguage {
    Japanese,
    #[default]
    English,
    French,
    German,
    Italian,
    Spanish,
}

/// User settings written into a generated firmware image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalFirmware {
    #[serde(default = "InternalFirmware::default_nickname")]
    pub nickname: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub language: FirmwareLanguage,
    /// Firmware colour index, 0-15.
    #[serde(default)]
    pub favourite_colour: u8,
    #[serde(default = "InternalFirmware::default_birthday_month")]
    pub birthday_month: u8,
    #[serde(default = "InternalFirmware::default_birthday_day")]
    pub birthday_day: u8,
    #[serde(default)]
    pub randomize_mac: bool,
}

impl InternalFirmware {
    fn default_nickname() -> String {
        "melonDS".to_string()
    }

    fn default_birthday_month() -> u8 {
        1
    }

    fn default_birthday_day() -> u8 {
        1
    }
}

impl Default for InternalFirmware {
    fn default() -> Self {
        Self {
            nickname: Self::default_nickname(),
            message: String::new(),
            language: FirmwareLanguage::default(),
            favourite_colour: 0,
            birthday_month: Self::default_birthday_month(),
            birthday_day: Self::default_birthday_day(),
            randomize_mac: false,
        }
    }
}

/// Where the DS boot firmware and BIOS images come from.
///
/// External dumps and the generated internal firmware are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FirmwareConfig {
    External {
        bios7: PathBuf,
        bios9: PathBuf,
        firmware: PathBuf,
    },
    Internal(InternalFirmware),
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        FirmwareConfig::Internal(InternalFirmware::default())
    }
}

/// DSi-specific boot assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsiPaths {
    #[serde(default)]
    pub bios7: Option<PathBuf>,
    #[serde(default)]
    pub bios9: Option<PathBuf>,
    #[serde(default)]
    pub firmware: Option<PathBuf>,
    #[serde(default)]
    pub nand: Option<PathBuf>,
}

/// Performance class requested from the audio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    LowLatency,
    #[default]
    Balanced,
    PowerSaving,
}

impl FromStr for LatencyClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "low_latency" | "low" => Ok(LatencyClass::LowLatency),
            "balanced" => Ok(LatencyClass::Balanced),
            "power_saving" => Ok(LatencyClass::PowerSaving),
            other => Err(ConfigError::Invalid(format!("unknown latency class: {other}"))),
        }
    }
}

/// Sound output settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "AudioConfig::default_enabled")]
    pub enabled: bool,
    /// 0 (silent) to [`MAX_VOLUME`] (unity gain).
    #[serde(default = "AudioConfig::default_volume")]
    pub volume: u16,
    #[serde(default)]
    pub latency: LatencyClass,
}

impl AudioConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_volume() -> u16 {
        MAX_VOLUME
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            volume: Self::default_volume(),
            latency: LatencyClass::default(),
        }
    }
}

/// What the emulated microphone hears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicSource {
    #[default]
    Silence,
    SyntheticNoise,
    HostMicrophone,
}

impl MicSource {
    /// Only the host microphone needs a live capture stream.
    pub fn needs_capture(self) -> bool {
        matches!(self, MicSource::HostMicrophone)
    }
}

impl FromStr for MicSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "silence" | "none" => Ok(MicSource::Silence),
            "noise" | "synthetic_noise" => Ok(MicSource::SyntheticNoise),
            "host" | "host_microphone" | "device" => Ok(MicSource::HostMicrophone),
            other => Err(ConfigError::Invalid(format!("unknown mic source: {other}"))),
        }
    }
}

/// Rolling rewind history settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds of emulated time between two checkpoints.
    #[serde(default = "RewindConfig::default_period_seconds")]
    pub period_seconds: u32,
    /// Seconds of emulated time kept in the window.
    #[serde(default = "RewindConfig::default_window_seconds")]
    pub window_seconds: u32,
    /// Upper bound on memory held by checkpoints.
    #[serde(default = "RewindConfig::default_max_memory_bytes")]
    pub max_memory_bytes: usize,
}

impl RewindConfig {
    fn default_period_seconds() -> u32 {
        10
    }

    fn default_window_seconds() -> u32 {
        300
    }

    fn default_max_memory_bytes() -> usize {
        256 * 1024 * 1024
    }

    /// Number of checkpoints the window may hold, before any memory bound.
    pub fn capacity(&self) -> usize {
        if !self.enabled || self.period_seconds == 0 {
            return 0;
        }
        (self.window_seconds / self.period_seconds) as usize
    }
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_seconds: Self::default_period_seconds(),
            window_seconds: Self::default_window_seconds(),
            max_memory_bytes: Self::default_max_memory_bytes(),
        }
    }
}

/// Everything `configure` needs to bring a session up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    #[serde(default)]
    pub console: ConsoleType,
    #[serde(default)]
    pub firmware: FirmwareConfig,
    #[serde(default)]
    pub dsi: DsiPaths,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub mic_source: MicSource,
    #[serde(default)]
    pub rewind: RewindConfig,
}

impl EmulatorConfig {
    /// Reject values the session cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.volume > MAX_VOLUME {
            return Err(ConfigError::Invalid(format!(
                "audio.volume {} exceeds maximum {}",
                self.audio.volume, MAX_VOLUME
            )));
        }

        if self.rewind.enabled {
            if self.rewind.period_seconds == 0 {
                return Err(ConfigError::Invalid(
                    "rewind.period_seconds must be at least 1".to_string(),
                ));
            }
            if self.rewind.window_seconds < self.rewind.period_seconds {
                return Err(ConfigError::Invalid(format!(
                    "rewind.window_seconds ({}) is shorter than rewind.period_seconds ({})",
                    self.rewind.window_seconds, self.rewind.period_seconds
                )));
            }
        }

        if let FirmwareConfig::Internal(fw) = &self.firmware {
            if fw.favourite_colour > 15 {
                return Err(ConfigError::Invalid(format!(
                    "firmware.favourite_colour {} is out of range 0-15",
                    fw.favourite_colour
                )));
            }
            if !(1..=12).contains(&fw.birthday_month) || !(1..=31).contains(&fw.birthday_day) {
                return Err(ConfigError::Invalid(format!(
                    "firmware birthday {}/{} is not a valid date",
                    fw.birthday_month, fw.birthday_day
                )));
            }
            if fw.nickname.chars().count() > 10 {
                return Err(ConfigError::Invalid(
                    "firmware.nickname is limited to 10 characters".to_string(),
                ));
            }
        }

        if self.console == ConsoleType::Dsi && self.dsi.nand.is_none() {
            return Err(ConfigError::Invalid(
                "console = dsi requires dsi.nand".to_string(),
            ));
        }

        Ok(())
    }
}
