// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Every struct maps to one section of `evsync.toml`. All sections and all
//! fields are optional in the file; missing values take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Decay policy names accepted in `[surface] policy` (aliases included).
pub const KNOWN_POLICIES: &[&str] = &[
    "exponential",
    "eros",
    "threshold",
    "tos",
    "competitive",
    "sits",
    "accumulative",
    "pim",
    "latest",
    "sae",
    "binary",
    "bin",
    "none",
];

/// Accepted values of `[window] mode`.
pub const KNOWN_WINDOW_MODES: &[&str] = &["count", "duration"];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EvSyncConfig {
    pub system: SystemConfig,
    pub sensor: SensorConfig,
    pub queue: QueueConfig,
    pub surface: SurfaceConfig,
    pub window: WindowConfig,
    pub synchronizer: SyncConfig,
}

/// System-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: String,
    /// "text" or "json"
    pub log_format: String,
    /// Directory for per-run log files; empty keeps logging on the console
    pub log_dir: PathBuf,
    /// Days of per-run log folders to keep
    pub log_retention_days: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_dir: PathBuf::new(),
            log_retention_days: 7,
        }
    }
}

/// Sensor geometry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    pub width: usize,
    pub height: usize,
    /// Cameras or modalities multiplexed on one stream
    pub channel_count: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            width: 304,
            height: 240,
            channel_count: 2,
        }
    }
}

/// Batch queue configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum pending batches; 0 = unbounded
    pub capacity: usize,
}

/// Decaying surface consumer configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Policy name, or "none" to keep only the event history
    pub policy: String,
    pub kernel_size: usize,
    /// Policy parameter; the policy's own default when unset
    pub parameter: Option<f64>,
    pub history_seconds: f64,
    pub max_cpu_delay_seconds: f64,
    pub catch_up_backlog: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            policy: "exponential".to_string(),
            kernel_size: 7,
            parameter: None,
            history_seconds: 0.5,
            max_cpu_delay_seconds: 0.05,
            catch_up_backlog: 4,
        }
    }
}

/// Fixed window consumer configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    /// "count" keeps `size` events, "duration" keeps `duration_seconds`
    pub mode: String,
    pub size: usize,
    pub duration_seconds: f64,
    /// Ingestion pauses every period until the window is read; unset = free-running
    pub strict_update_period_seconds: Option<f64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            mode: "count".to_string(),
            size: 1000,
            duration_seconds: 0.1,
            strict_update_period_seconds: None,
        }
    }
}

/// Multi-stream synchronizer configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// A reference clock further ahead than this is re-seeded
    pub stale_reference_seconds: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_reference_seconds: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EvSyncConfig = toml::from_str(
            r#"
            [sensor]
            width = 640

            [window]
            mode = "duration"
            strict_update_period_seconds = 0.02
            "#,
        )
        .unwrap();
        assert_eq!(config.sensor.width, 640);
        assert_eq!(config.sensor.height, 240);
        assert_eq!(config.window.mode, "duration");
        assert_eq!(config.window.strict_update_period_seconds, Some(0.02));
        assert_eq!(config.surface, SurfaceConfig::default());
    }

    #[test]
    fn test_serde_json_shape() {
        let json = serde_json::to_value(QueueConfig { capacity: 16 }).unwrap();
        assert_eq!(json["capacity"], 16);
    }
}
