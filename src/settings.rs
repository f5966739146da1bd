// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mapping from `evsync.toml` sections onto the runtime configuration types.
//!
//! The config crate keeps names and durations as strings and seconds; this
//! module resolves policy names, converts seconds to ticks and rejects
//! anything the consumers would refuse later.

use std::path::Path;

use evsync_config::{validate_config, ConfigError, EvSyncConfig};
use evsync_ingest::{SurfaceConsumerConfig, SynchronizerConfig, WindowConsumerConfig};
use evsync_observability::{LogFormat, LoggingConfig};
use evsync_structures::{seconds_to_ticks, EventStreamError, Result};
use evsync_surfaces::{DecayPolicyKind, WindowBound};
use tracing::debug;

/// Everything a tool needs to build the engine from one configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub queue_capacity: usize,
    pub surface: SurfaceConsumerConfig,
    pub window: WindowConsumerConfig,
    pub synchronizer: SynchronizerConfig,
    pub logging: LoggingConfig,
}

impl EngineSettings {
    /// Validate `config` and resolve it into runtime types
    pub fn from_config(config: &EvSyncConfig) -> Result<Self> {
        validate_config(config).map_err(config_error)?;

        let settings = Self {
            queue_capacity: config.queue.capacity,
            surface: surface_config(config)?,
            window: window_config(config)?,
            synchronizer: synchronizer_config(config)?,
            logging: logging_config(config)?,
        };
        debug!(
            "[SETTINGS] {}x{} sensor, {} channels, policy {:?}, window {:?}",
            config.sensor.width,
            config.sensor.height,
            config.sensor.channel_count,
            settings.surface.policy,
            settings.window.bound
        );
        Ok(settings)
    }

    /// Load `evsync.toml` (or the file at `path`), apply `EVSYNC_*`
    /// overrides and resolve the result
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = evsync_config::load_config(path, None).map_err(config_error)?;
        Self::from_config(&config)
    }
}

fn config_error(err: ConfigError) -> EventStreamError {
    EventStreamError::InvalidConfiguration(err.to_string())
}

/// Resolve a policy name; `"none"` disables the decay grid
pub fn parse_policy(name: &str) -> Result<Option<DecayPolicyKind>> {
    if name.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    name.parse::<DecayPolicyKind>().map(Some)
}

fn duration_ticks(field: &str, seconds: f64) -> Result<u32> {
    u32::try_from(seconds_to_ticks(seconds)).map_err(|_| {
        EventStreamError::InvalidConfiguration(format!("{} = {}s is out of range", field, seconds))
    })
}

pub fn surface_config(config: &EvSyncConfig) -> Result<SurfaceConsumerConfig> {
    let policy = parse_policy(&config.surface.policy)?;
    let parameter = match (policy, config.surface.parameter) {
        (_, Some(parameter)) => parameter,
        (Some(kind), None) => kind.default_parameter(),
        (None, None) => 0.0,
    };

    let surface = SurfaceConsumerConfig {
        width: config.sensor.width,
        height: config.sensor.height,
        channel_count: config.sensor.channel_count,
        policy,
        kernel_size: config.surface.kernel_size,
        parameter,
        history_seconds: config.surface.history_seconds,
        max_cpu_delay_seconds: config.surface.max_cpu_delay_seconds,
        catch_up_backlog: config.surface.catch_up_backlog,
    };
    surface.validate()?;
    Ok(surface)
}

pub fn window_bound(config: &EvSyncConfig) -> Result<WindowBound> {
    let bound = match config.window.mode.trim().to_ascii_lowercase().as_str() {
        "count" => WindowBound::Count(config.window.size),
        "duration" => WindowBound::Duration(duration_ticks(
            "window.duration_seconds",
            config.window.duration_seconds,
        )?),
        other => {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "unknown window mode '{}'",
                other
            )))
        }
    };
    bound.validate()?;
    Ok(bound)
}

pub fn strict_period_ticks(config: &EvSyncConfig) -> Result<Option<u32>> {
    config
        .window
        .strict_update_period_seconds
        .map(|seconds| duration_ticks("window.strict_update_period_seconds", seconds))
        .transpose()
}

pub fn window_config(config: &EvSyncConfig) -> Result<WindowConsumerConfig> {
    let window = WindowConsumerConfig {
        channel_count: config.sensor.channel_count,
        bound: window_bound(config)?,
        strict_period_ticks: strict_period_ticks(config)?,
    };
    window.validate()?;
    Ok(window)
}

pub fn synchronizer_config(config: &EvSyncConfig) -> Result<SynchronizerConfig> {
    let synchronizer = SynchronizerConfig {
        channel_count: config.sensor.channel_count,
        bound: window_bound(config)?,
        queue_capacity: config.queue.capacity,
        strict_period_ticks: strict_period_ticks(config)?,
        stale_reference_seconds: config.synchronizer.stale_reference_seconds,
    };
    synchronizer.validate()?;
    Ok(synchronizer)
}

pub fn logging_config(config: &EvSyncConfig) -> Result<LoggingConfig> {
    let format = config
        .system
        .log_format
        .parse::<LogFormat>()
        .map_err(|e| EventStreamError::InvalidConfiguration(e.to_string()))?;
    let log_dir = if config.system.log_dir.as_os_str().is_empty() {
        None
    } else {
        Some(config.system.log_dir.clone())
    };

    Ok(LoggingConfig {
        level: config.system.log_level.clone(),
        format,
        log_dir,
        retention_days: config.system.log_retention_days,
        ..LoggingConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evsync_config::KNOWN_POLICIES;
    use evsync_structures::MAX_STAMP;

    #[test]
    fn test_every_known_policy_name_resolves() {
        for name in KNOWN_POLICIES {
            let resolved = parse_policy(name).unwrap();
            assert_eq!(resolved.is_none(), *name == "none", "policy {}", name);
        }
        assert!(parse_policy("gaussian").is_err());
    }

    #[test]
    fn test_defaults_resolve() {
        let settings = EngineSettings::from_config(&EvSyncConfig::default()).unwrap();
        assert_eq!(settings.surface, SurfaceConsumerConfig::default());
        assert_eq!(settings.window.bound, WindowBound::Count(1000));
        assert_eq!(settings.window.strict_period_ticks, None);
        assert_eq!(settings.synchronizer.stale_reference_seconds, 5.0);
        assert_eq!(settings.logging.format, LogFormat::Text);
        assert!(settings.logging.log_dir.is_none());
    }

    #[test]
    fn test_parameter_falls_back_to_policy_default() {
        let mut config = EvSyncConfig::default();
        config.surface.policy = "TOS".to_string();
        let surface = surface_config(&config).unwrap();
        assert_eq!(surface.policy, Some(DecayPolicyKind::Threshold));
        assert_eq!(surface.parameter, DecayPolicyKind::Threshold.default_parameter());

        config.surface.parameter = Some(3.0);
        assert_eq!(surface_config(&config).unwrap().parameter, 3.0);

        config.surface.policy = "none".to_string();
        config.surface.parameter = None;
        let surface = surface_config(&config).unwrap();
        assert_eq!(surface.policy, None);
        assert_eq!(surface.parameter, 0.0);
    }

    #[test]
    fn test_duration_window_in_ticks() {
        let mut config = EvSyncConfig::default();
        config.window.mode = "duration".to_string();
        config.window.duration_seconds = 0.1;
        config.window.strict_update_period_seconds = Some(0.02);

        let window = window_config(&config).unwrap();
        assert_eq!(window.bound, WindowBound::Duration(1_250_000));
        assert_eq!(window.strict_period_ticks, Some(250_000));

        let sync = synchronizer_config(&config).unwrap();
        assert_eq!(sync.bound, window.bound);
        assert_eq!(sync.strict_period_ticks, Some(250_000));
    }

    #[test]
    fn test_rejected_before_threads_exist() {
        let mut config = EvSyncConfig::default();
        config.window.mode = "duration".to_string();
        config.window.duration_seconds = 1.0;
        assert!(1.0 * evsync_structures::TICKS_PER_SECOND > (MAX_STAMP / 2) as f64);

        match EngineSettings::from_config(&config) {
            Err(EventStreamError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("window.duration_seconds"))
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_threshold_parameter_must_be_non_negative() {
        let mut config = EvSyncConfig::default();
        config.surface.policy = "threshold".to_string();
        config.surface.parameter = Some(-1.0);
        // Policy ranges are enforced by the runtime config, not the file validator
        assert!(surface_config(&config).is_err());
    }

    #[test]
    fn test_logging_section() {
        let mut config = EvSyncConfig::default();
        config.system.log_format = "json".to_string();
        config.system.log_dir = "/tmp/evsync-logs".into();
        config.system.log_level = "debug".to_string();

        let logging = logging_config(&config).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.log_dir.as_deref(), Some(Path::new("/tmp/evsync-logs")));
        assert_eq!(logging.retention_days, 7);
    }
}
