// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Checks ranges and names before any consumer thread is created. All
//! problems are collected and reported together.

use crate::types::{KNOWN_POLICIES, KNOWN_WINDOW_MODES};
use crate::{ConfigError, ConfigResult, EvSyncConfig};
use evsync_structures::{seconds_to_ticks, ticks_to_seconds, MAX_STAMP};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    NotPositive { field: String },
    UnknownName { field: String, value: String, expected: String },
    DurationTooLong { field: String, seconds: f64 },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPositive { field } => write!(f, "{} must be positive", field),
            Self::UnknownName {
                field,
                value,
                expected,
            } => write!(
                f,
                "{} = '{}' is not one of: {}",
                field, value, expected
            ),
            Self::DurationTooLong { field, seconds } => write!(
                f,
                "{} = {}s must be below {:.3}s (half the timestamp range)",
                field,
                seconds,
                max_duration_seconds()
            ),
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

fn max_duration_seconds() -> f64 {
    ticks_to_seconds((MAX_STAMP / 2) as u64)
}

/// Validate the complete configuration
///
/// Checks for:
/// - positive sensor dimensions, channel count, kernel size and window size
/// - known policy and window mode names
/// - durations below half the timestamp range
/// - positive CPU delay and staleness threshold
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation
pub fn validate_config(config: &EvSyncConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_geometry(config, &mut errors);
    validate_names(config, &mut errors);
    validate_durations(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_geometry(config: &EvSyncConfig, errors: &mut Vec<ConfigValidationError>) {
    for (field, value) in [
        ("sensor.width", config.sensor.width),
        ("sensor.height", config.sensor.height),
        ("sensor.channel_count", config.sensor.channel_count),
        ("surface.kernel_size", config.surface.kernel_size),
        ("surface.catch_up_backlog", config.surface.catch_up_backlog),
        ("window.size", config.window.size),
    ] {
        if value == 0 {
            errors.push(ConfigValidationError::NotPositive {
                field: field.to_string(),
            });
        }
    }
    if config.sensor.channel_count > 256 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "sensor.channel_count".to_string(),
            reason: format!("{} exceeds the 256 addressable channels", config.sensor.channel_count),
        });
    }
}

fn validate_names(config: &EvSyncConfig, errors: &mut Vec<ConfigValidationError>) {
    let policy = config.surface.policy.to_ascii_lowercase();
    if !KNOWN_POLICIES.contains(&policy.as_str()) {
        errors.push(ConfigValidationError::UnknownName {
            field: "surface.policy".to_string(),
            value: config.surface.policy.clone(),
            expected: KNOWN_POLICIES.join(", "),
        });
    }
    let mode = config.window.mode.to_ascii_lowercase();
    if !KNOWN_WINDOW_MODES.contains(&mode.as_str()) {
        errors.push(ConfigValidationError::UnknownName {
            field: "window.mode".to_string(),
            value: config.window.mode.clone(),
            expected: KNOWN_WINDOW_MODES.join(", "),
        });
    }
    let format = config.system.log_format.to_ascii_lowercase();
    if format != "text" && format != "json" {
        errors.push(ConfigValidationError::UnknownName {
            field: "system.log_format".to_string(),
            value: config.system.log_format.clone(),
            expected: "text, json".to_string(),
        });
    }
}

fn validate_durations(config: &EvSyncConfig, errors: &mut Vec<ConfigValidationError>) {
    let limit = (MAX_STAMP / 2) as u64;
    let mut durations = vec![
        ("surface.history_seconds", config.surface.history_seconds),
        ("surface.max_cpu_delay_seconds", config.surface.max_cpu_delay_seconds),
        ("window.duration_seconds", config.window.duration_seconds),
    ];
    if let Some(period) = config.window.strict_update_period_seconds {
        durations.push(("window.strict_update_period_seconds", period));
    }

    for (field, seconds) in durations {
        if !(seconds > 0.0) || seconds_to_ticks(seconds) == 0 {
            errors.push(ConfigValidationError::NotPositive {
                field: field.to_string(),
            });
        } else if seconds_to_ticks(seconds) >= limit {
            errors.push(ConfigValidationError::DurationTooLong {
                field: field.to_string(),
                seconds,
            });
        }
    }

    if !(config.synchronizer.stale_reference_seconds > 0.0) {
        errors.push(ConfigValidationError::NotPositive {
            field: "synchronizer.stale_reference_seconds".to_string(),
        });
    }
    if let Some(parameter) = config.surface.parameter {
        if !parameter.is_finite() {
            errors.push(ConfigValidationError::InvalidValue {
                field: "surface.parameter".to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(config: &EvSyncConfig) -> String {
        match validate_config(config) {
            Err(ConfigError::ValidationError(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_dimensions_and_kernel() {
        let mut config = EvSyncConfig::default();
        config.sensor.width = 0;
        config.surface.kernel_size = 0;
        config.sensor.channel_count = 0;

        let msg = message(&config);
        assert!(msg.contains("sensor.width"));
        assert!(msg.contains("surface.kernel_size"));
        assert!(msg.contains("sensor.channel_count"));
    }

    #[test]
    fn test_unknown_policy_and_mode() {
        let mut config = EvSyncConfig::default();
        config.surface.policy = "gaussian".to_string();
        config.window.mode = "sliding".to_string();

        let msg = message(&config);
        assert!(msg.contains("surface.policy"));
        assert!(msg.contains("eros"));
        assert!(msg.contains("window.mode"));
    }

    #[test]
    fn test_policy_names_are_case_insensitive() {
        let mut config = EvSyncConfig::default();
        config.surface.policy = "SITS".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duration_limits() {
        let mut config = EvSyncConfig::default();
        config.surface.history_seconds = 1.0;
        config.window.strict_update_period_seconds = Some(0.0);
        config.surface.max_cpu_delay_seconds = -0.1;

        let msg = message(&config);
        assert!(msg.contains("surface.history_seconds"));
        assert!(msg.contains("half the timestamp range"));
        assert!(msg.contains("window.strict_update_period_seconds must be positive"));
        assert!(msg.contains("surface.max_cpu_delay_seconds must be positive"));
    }

    #[test]
    fn test_zero_window_size() {
        let mut config = EvSyncConfig::default();
        config.window.size = 0;
        assert!(message(&config).contains("window.size"));
    }
}
