//! Runtime configuration for stint-daemon.
//!
//! Loaded from `~/.stint/config.toml`. A missing file yields defaults;
//! a malformed file is reported so the caller can warn and fall back.

use fs_err as fs;
use serde::Deserialize;
use std::path::Path;

use stint_core::TICK_INTERVAL_MS;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub timer: TimerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimerConfig {
    pub tick_interval_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
        }
    }
}

pub fn load_config(path: &Path) -> Result<DaemonConfig, String> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DaemonConfig::default())
        }
        Err(err) => return Err(format!("Failed to read config: {}", err)),
    };

    let config: DaemonConfig =
        toml::from_str(&data).map_err(|err| format!("Failed to parse config: {}", err))?;
    if config.timer.tick_interval_ms == 0 {
        return Err("tick_interval_ms must be positive".to_string());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = load_config(&temp_dir.path().join("config.toml")).expect("load config");
        assert_eq!(config.timer.tick_interval_ms, TICK_INTERVAL_MS);
    }

    #[test]
    fn parses_timer_section() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[timer]\ntick_interval_ms = 250\n").expect("write config");

        let config = load_config(&path).expect("load config");
        assert_eq!(config.timer.tick_interval_ms, 250);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[timer\n").expect("write config");

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[timer]\ntick_interval_ms = 0\n").expect("write config");

        assert!(load_config(&path).is_err());
    }
}
