//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, FirmwareConfig, MelonConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Where the effective configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Files merged, first to last.
    pub files: Vec<PathBuf>,
    /// `MELONDS_*` / `RUST_LOG` variables that were applied.
    pub env_overrides: Vec<String>,
}

/// Existing config files in load order: system, user, local.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Like [`discover_config_files`], but an existing `cli_path` takes the
/// place of `./melonds.toml`.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let user = directories::BaseDirs::new().map(|d| d.config_dir().join("melonds/config.toml"));
    let local = match cli_path {
        Some(path) if path.exists() => path.to_path_buf(),
        _ => PathBuf::from("melonds.toml"),
    };

    [Some(PathBuf::from("/etc/melonds/config.toml")), user, Some(local)]
        .into_iter()
        .flatten()
        .filter(|candidate| candidate.exists())
        .collect()
}

/// Read a config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a single config file on top of compiled defaults.
pub fn load_from_file(path: &Path) -> Result<MelonConfig, ConfigError> {
    let table = load_table(path)?;
    let mut config = from_table(table, path)?;
    expand_config_paths(&mut config);
    Ok(config)
}

/// Deserialize a merged table into a typed config.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<MelonConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
}

/// Expand `~/` and `$VAR` prefixes in every path read from config files.
pub fn expand_config_paths(config: &mut MelonConfig) {
    let paths = &mut config.infra.paths;
    expand_in_place(&mut paths.config_dir);
    if let Some(dir) = paths.savestate_dir.as_mut() {
        expand_in_place(dir);
    }

    if let FirmwareConfig::External {
        bios7,
        bios9,
        firmware,
    } = &mut config.emulator.firmware
    {
        expand_in_place(bios7);
        expand_in_place(bios9);
        expand_in_place(firmware);
    }

    let dsi = &mut config.emulator.dsi;
    for path in [&mut dsi.bios7, &mut dsi.bios9, &mut dsi.firmware, &mut dsi.nand]
        .into_iter()
        .flatten()
    {
        expand_in_place(path);
    }
}

fn expand_in_place(path: &mut PathBuf) {
    if let Some(raw) = path.to_str() {
        *path = expand_path(raw);
    }
}

/// Merge `overlay` into `base`, key by key. Nested tables merge recursively;
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                // A tagged enum switching variant must not inherit the old
                // variant's fields.
                if existing.get("mode").is_some()
                    && incoming.get("mode").is_some()
                    && existing.get("mode") != incoming.get("mode")
                {
                    *existing = incoming;
                } else {
                    merge_tables(existing, incoming);
                }
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
///
/// Values that fail to parse are skipped and not recorded as overrides.
pub fn apply_env_overrides(config: &mut MelonConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("MELONDS_CONFIG_DIR") {
        config.infra.paths.config_dir = expand_path(&v);
        sources.env_overrides.push("MELONDS_CONFIG_DIR".to_string());
    }
    if let Ok(v) = env::var("MELONDS_SAVESTATE_DIR") {
        config.infra.paths.savestate_dir = Some(expand_path(&v));
        sources.env_overrides.push("MELONDS_SAVESTATE_DIR".to_string());
    }

    if let Ok(v) = env::var("MELONDS_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("MELONDS_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Ok(v) = env::var("MELONDS_VOLUME") {
        if let Ok(volume) = v.parse() {
            config.emulator.audio.volume = volume;
            sources.env_overrides.push("MELONDS_VOLUME".to_string());
        }
    }
    if let Ok(v) = env::var("MELONDS_AUDIO_LATENCY") {
        if let Ok(latency) = v.parse() {
            config.emulator.audio.latency = latency;
            sources.env_overrides.push("MELONDS_AUDIO_LATENCY".to_string());
        }
    }
    if let Ok(v) = env::var("MELONDS_MIC_SOURCE") {
        if let Ok(source) = v.parse() {
            config.emulator.mic_source = source;
            sources.env_overrides.push("MELONDS_MIC_SOURCE".to_string());
        }
    }
    if let Ok(v) = env::var("MELONDS_REWIND_ENABLED") {
        if let Some(enabled) = parse_bool(&v) {
            config.emulator.rewind.enabled = enabled;
            sources.env_overrides.push("MELONDS_REWIND_ENABLED".to_string());
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand a leading `~/` or `$VAR` component. Unknown variables are left as-is.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(rest),
            None => PathBuf::from(path),
        };
    }

    let Some(rest) = path.strip_prefix('$') else {
        return PathBuf::from(path);
    };
    let (name, tail) = rest.split_once('/').unwrap_or((rest, ""));
    match env::var(name) {
        Ok(value) if tail.is_empty() => PathBuf::from(value),
        Ok(value) => Path::new(&value).join(tail),
        Err(_) => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LatencyClass, MicSource};
    use std::io::Write;
    use tempfile::TempDir;

    fn table(s: &str) -> toml::Table {
        s.parse().unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/roms/game.nds");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("roms/game.nds"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_path_env_var() {
        std::env::set_var("MELONCONF_TEST_ROOT", "/srv/melon");
        assert_eq!(
            expand_path("$MELONCONF_TEST_ROOT/bios/bios7.bin"),
            PathBuf::from("/srv/melon/bios/bios7.bin")
        );
        assert_eq!(
            expand_path("$MELONCONF_TEST_UNSET/x"),
            PathBuf::from("$MELONCONF_TEST_UNSET/x")
        );
    }

    #[test]
    fn test_cli_override_replaces_local() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("override.toml");
        std::fs::write(&path, "")?;

        let files = discover_config_files_with_override(Some(&path));
        assert_eq!(files.last(), Some(&path));
        Ok(())
    }

    #[test]
    fn test_merge_nested_tables() {
        let mut base = table(
            r#"
[emulator.audio]
volume = 100
latency = "power_saving"
"#,
        );
        merge_tables(
            &mut base,
            table(
                r#"
[emulator.audio]
volume = 200
"#,
            ),
        );

        let config = from_table(base, Path::new("merged")).unwrap();
        assert_eq!(config.emulator.audio.volume, 200);
        assert_eq!(config.emulator.audio.latency, LatencyClass::PowerSaving);
    }

    #[test]
    fn test_merge_switches_firmware_mode_cleanly() {
        let mut base = table(
            r#"
[emulator.firmware]
mode = "internal"
nickname = "Old"
"#,
        );
        merge_tables(
            &mut base,
            table(
                r#"
[emulator.firmware]
mode = "external"
bios7 = "/b7"
bios9 = "/b9"
firmware = "/fw"
"#,
            ),
        );

        let config = from_table(base, Path::new("merged")).unwrap();
        assert!(matches!(
            config.emulator.firmware,
            FirmwareConfig::External { .. }
        ));
    }

    #[test]
    fn test_load_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("melonds.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(
            file,
            r#"
[paths]
config_dir = "/data/melonds"

[emulator]
console = "ds"
mic_source = "synthetic_noise"

[emulator.rewind]
enabled = true
period_seconds = 2
window_seconds = 60
"#
        )?;

        let config = load_from_file(&path)?;
        assert_eq!(config.infra.paths.config_dir, PathBuf::from("/data/melonds"));
        assert_eq!(config.emulator.mic_source, MicSource::SyntheticNoise);
        assert_eq!(config.emulator.rewind.capacity(), 30);
        Ok(())
    }

    #[test]
    fn test_file_paths_are_expanded() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("melonds.toml");
        std::fs::write(
            &path,
            r#"
[paths]
config_dir = "~/.config/melonds"
savestate_dir = "~/saves"

[emulator.firmware]
mode = "external"
bios7 = "~/bios/bios7.bin"
bios9 = "/abs/bios9.bin"
firmware = "~/bios/firmware.bin"

[emulator.dsi]
nand = "~/dsi/nand.bin"
"#,
        )?;

        let config = load_from_file(&path)?;
        let home = directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .ok_or("no home directory")?;

        assert_eq!(config.infra.paths.config_dir, home.join(".config/melonds"));
        assert_eq!(config.infra.paths.savestate_dir, Some(home.join("saves")));
        match &config.emulator.firmware {
            FirmwareConfig::External {
                bios7,
                bios9,
                firmware,
            } => {
                assert_eq!(bios7, &home.join("bios/bios7.bin"));
                assert_eq!(bios9, &PathBuf::from("/abs/bios9.bin"));
                assert_eq!(firmware, &home.join("bios/firmware.bin"));
            }
            other => panic!("expected external firmware, got {other:?}"),
        }
        assert_eq!(config.emulator.dsi.nand, Some(home.join("dsi/nand.bin")));
        Ok(())
    }

    #[test]
    fn test_load_reports_parse_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[emulator\nvolume = ")?;

        match load_from_file(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_from_file(Path::new("/nonexistent/melonds.toml"));
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }
}
