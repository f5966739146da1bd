// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)
//!
//! Environment variables and CLI arguments share one set of keys; the
//! environment variable for key `k` is `EVSYNC_<K>`.

use crate::{ConfigError, ConfigResult, EvSyncConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "evsync.toml";

/// Environment variable pointing at a config file
pub const CONFIG_PATH_ENV: &str = "EVSYNC_CONFIG_PATH";

/// Override keys, in the order environment variables are applied.
const OVERRIDE_KEYS: &[&str] = &[
    "log_level",
    "log_format",
    "log_dir",
    "width",
    "height",
    "channel_count",
    "queue_capacity",
    "policy",
    "kernel_size",
    "parameter",
    "history_seconds",
    "max_cpu_delay",
    "catch_up_backlog",
    "window_mode",
    "window_size",
    "window_duration",
    "strict_period",
    "stale_reference",
];

/// Find the evsync configuration file
///
/// Search order:
/// 1. `EVSYNC_CONFIG_PATH` environment variable
/// 2. Current working directory: `./evsync.toml`
/// 3. Up to five parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.clone();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent.to_path_buf();
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is missing, contains invalid TOML, or an
/// override value cannot be parsed. Range checks are left to
/// [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<EvSyncConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: EvSyncConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

/// Apply `EVSYNC_*` environment variable overrides
///
/// Supported environment variables (key in parentheses):
/// - `EVSYNC_LOG_LEVEL` (`log_level`) -> `system.log_level`
/// - `EVSYNC_LOG_FORMAT` (`log_format`) -> `system.log_format`
/// - `EVSYNC_LOG_DIR` (`log_dir`) -> `system.log_dir`
/// - `EVSYNC_WIDTH` / `EVSYNC_HEIGHT` / `EVSYNC_CHANNEL_COUNT` -> `sensor.*`
/// - `EVSYNC_QUEUE_CAPACITY` -> `queue.capacity`
/// - `EVSYNC_POLICY`, `EVSYNC_KERNEL_SIZE`, `EVSYNC_PARAMETER`,
///   `EVSYNC_HISTORY_SECONDS`, `EVSYNC_MAX_CPU_DELAY`, `EVSYNC_CATCH_UP_BACKLOG` -> `surface.*`
/// - `EVSYNC_WINDOW_MODE`, `EVSYNC_WINDOW_SIZE`, `EVSYNC_WINDOW_DURATION`,
///   `EVSYNC_STRICT_PERIOD` -> `window.*`
/// - `EVSYNC_STALE_REFERENCE` -> `synchronizer.stale_reference_seconds`
pub fn apply_environment_overrides(config: &mut EvSyncConfig) -> ConfigResult<()> {
    for key in OVERRIDE_KEYS {
        let var = format!("EVSYNC_{}", key.to_ascii_uppercase());
        if let Ok(value) = env::var(&var) {
            apply_override(config, key, &value)?;
        }
    }
    Ok(())
}

/// Apply CLI argument overrides
///
/// * `cli_args` - map of override keys to values (e.g. `{"width": "640", "policy": "sae"}`)
///
/// Unknown keys are ignored so callers can pass their whole argument map.
pub fn apply_cli_overrides(
    config: &mut EvSyncConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    for key in OVERRIDE_KEYS {
        if let Some(value) = cli_args.get(*key) {
            apply_override(config, key, value)?;
        }
    }
    Ok(())
}

/// Set one override key. Returns `Ok(false)` for an unknown key.
pub fn apply_override(config: &mut EvSyncConfig, key: &str, value: &str) -> ConfigResult<bool> {
    match key {
        "log_level" => config.system.log_level = value.to_string(),
        "log_format" => config.system.log_format = value.to_string(),
        "log_dir" => config.system.log_dir = PathBuf::from(value),
        "width" => config.sensor.width = parse(key, value)?,
        "height" => config.sensor.height = parse(key, value)?,
        "channel_count" => config.sensor.channel_count = parse(key, value)?,
        "queue_capacity" => config.queue.capacity = parse(key, value)?,
        "policy" => config.surface.policy = value.to_string(),
        "kernel_size" => config.surface.kernel_size = parse(key, value)?,
        "parameter" => config.surface.parameter = Some(parse(key, value)?),
        "history_seconds" => config.surface.history_seconds = parse(key, value)?,
        "max_cpu_delay" => config.surface.max_cpu_delay_seconds = parse(key, value)?,
        "catch_up_backlog" => config.surface.catch_up_backlog = parse(key, value)?,
        "window_mode" => config.window.mode = value.to_string(),
        "window_size" => config.window.size = parse(key, value)?,
        "window_duration" => config.window.duration_seconds = parse(key, value)?,
        "strict_period" => {
            config.window.strict_update_period_seconds = match value.trim() {
                "" | "off" | "none" => None,
                other => Some(parse(key, other)?),
            }
        }
        "stale_reference" => config.synchronizer.stale_reference_seconds = parse(key, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        ConfigError::InvalidValue(format!("cannot parse '{}' for override '{}'", value, key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        File::create(&config_path).unwrap();

        env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var(CONFIG_PATH_ENV, "/definitely/not/here/evsync.toml");
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_ENV);
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved_width = env::var("EVSYNC_WIDTH").ok();
        env::remove_var("EVSYNC_WIDTH");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[sensor]").unwrap();
        writeln!(file, "width = 346").unwrap();
        writeln!(file, "height = 260").unwrap();
        writeln!(file, "[surface]").unwrap();
        writeln!(file, "policy = \"sae\"").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.sensor.width, 346);
        assert_eq!(config.sensor.height, 260);
        assert_eq!(config.surface.policy, "sae");
        assert_eq!(config.queue.capacity, 0);

        if let Some(value) = saved_width {
            env::set_var("EVSYNC_WIDTH", value);
        }
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = EvSyncConfig::default();

        env::set_var("EVSYNC_QUEUE_CAPACITY", "32");
        env::set_var("EVSYNC_STRICT_PERIOD", "0.01");
        let result = apply_environment_overrides(&mut config);
        env::remove_var("EVSYNC_QUEUE_CAPACITY");
        env::remove_var("EVSYNC_STRICT_PERIOD");

        assert!(result.is_ok());
        assert_eq!(config.queue.capacity, 32);
        assert_eq!(config.window.strict_update_period_seconds, Some(0.01));
    }

    #[test]
    fn test_bad_environment_value_is_reported() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = EvSyncConfig::default();
        env::set_var("EVSYNC_KERNEL_SIZE", "seven");
        let result = apply_environment_overrides(&mut config);
        env::remove_var("EVSYNC_KERNEL_SIZE");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = EvSyncConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("policy".to_string(), "tos".to_string());
        cli_args.insert("parameter".to_string(), "3".to_string());
        cli_args.insert("strict_period".to_string(), "off".to_string());
        cli_args.insert("unrelated".to_string(), "ignored".to_string());

        apply_cli_overrides(&mut config, &cli_args).unwrap();

        assert_eq!(config.surface.policy, "tos");
        assert_eq!(config.surface.parameter, Some(3.0));
        assert_eq!(config.window.strict_update_period_seconds, None);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[sensor]").unwrap();
        writeln!(file, "width = 100").unwrap();
        writeln!(file, "height = 100").unwrap();

        env::set_var("EVSYNC_WIDTH", "200");
        env::set_var("EVSYNC_HEIGHT", "200");

        let mut cli_args = HashMap::new();
        cli_args.insert("width".to_string(), "300".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args));

        env::remove_var("EVSYNC_WIDTH");
        env::remove_var("EVSYNC_HEIGHT");

        let config = config.unwrap();
        // CLI wins for width, env wins for height (no CLI override)
        assert_eq!(config.sensor.width, 300);
        assert_eq!(config.sensor.height, 200);
    }

    #[test]
    fn test_unknown_key() {
        let mut config = EvSyncConfig::default();
        assert!(!apply_override(&mut config, "colour", "red").unwrap());
        assert_eq!(config, EvSyncConfig::default());
    }
}
