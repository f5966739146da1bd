// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decaying per-pixel surfaces.
//!
//! A [`DecayingSurface`] is a dense grid updated one event at a time. The
//! [`DecayPolicy`] decides what an update does to the cell and to the
//! `kernel_size x kernel_size` neighbourhood around it, so the per-event cost
//! is O(kernel area) regardless of the sensor resolution.
//!
//! The grid is padded by `kernel_size / 2` on every side, so a kernel centred
//! on a border pixel never needs clipping. Padding cells are never exposed.

use crate::check_dimensions;
use evsync_structures::{Event, EventStreamError, Result, Stamp};
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Value written to the updated cell by the max-writing policies.
pub const SURFACE_MAX: f64 = 255.0;

/// Policy names as they appear in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayPolicyKind {
    #[serde(alias = "eros")]
    Exponential,
    #[serde(alias = "tos")]
    Threshold,
    #[serde(alias = "sits")]
    Competitive,
    #[serde(alias = "pim")]
    Accumulative,
    #[serde(alias = "sae")]
    Latest,
    #[serde(alias = "bin")]
    Binary,
}

impl DecayPolicyKind {
    pub const ALL: [DecayPolicyKind; 6] = [
        DecayPolicyKind::Exponential,
        DecayPolicyKind::Threshold,
        DecayPolicyKind::Competitive,
        DecayPolicyKind::Accumulative,
        DecayPolicyKind::Latest,
        DecayPolicyKind::Binary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DecayPolicyKind::Exponential => "exponential",
            DecayPolicyKind::Threshold => "threshold",
            DecayPolicyKind::Competitive => "competitive",
            DecayPolicyKind::Accumulative => "accumulative",
            DecayPolicyKind::Latest => "latest",
            DecayPolicyKind::Binary => "binary",
        }
    }

    /// Parameter used when configuration leaves it unset.
    pub fn default_parameter(self) -> f64 {
        match self {
            DecayPolicyKind::Exponential => 0.3,
            DecayPolicyKind::Threshold => 2.0,
            _ => 0.0,
        }
    }
}

impl FromStr for DecayPolicyKind {
    type Err = EventStreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" | "eros" => Ok(DecayPolicyKind::Exponential),
            "threshold" | "tos" => Ok(DecayPolicyKind::Threshold),
            "competitive" | "sits" => Ok(DecayPolicyKind::Competitive),
            "accumulative" | "pim" => Ok(DecayPolicyKind::Accumulative),
            "latest" | "sae" => Ok(DecayPolicyKind::Latest),
            "binary" | "bin" => Ok(DecayPolicyKind::Binary),
            other => Err(EventStreamError::InvalidConfiguration(format!(
                "unknown decay policy '{}'",
                other
            ))),
        }
    }
}

impl Display for DecayPolicyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-event mutation rule, with kernel-derived constants resolved up front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayPolicy {
    /// Neighbourhood multiplied by `decay_factor`, centre set to max.
    Exponential { decay_factor: f64 },
    /// Neighbourhood cells below `threshold` zeroed, others decremented, centre set to max.
    Threshold { threshold: f64 },
    /// Neighbourhood cells above the old centre decremented, centre set to `rank_ceiling`.
    Competitive { rank_ceiling: f64 },
    /// Centre incremented or decremented by one on polarity.
    Accumulative,
    /// Centre set to the raw stamp.
    Latest,
    /// Centre set to max.
    Binary,
}

impl DecayPolicy {
    /// Resolve a policy for the given kernel size.
    ///
    /// `parameter` is the half-life for exponential decay (`decay_factor =
    /// parameter^(1/kernel_size)`, must lie in `(0, 1]`) and the per-pixel
    /// threshold step for the countdown (`threshold = 255 - kernel_size *
    /// parameter`). The other policies ignore it.
    pub fn new(kind: DecayPolicyKind, kernel_size: usize, parameter: f64) -> Result<Self> {
        if kernel_size == 0 {
            return Err(EventStreamError::InvalidConfiguration(
                "kernel size must be positive".to_string(),
            ));
        }
        let k = kernel_size as f64;
        match kind {
            DecayPolicyKind::Exponential => {
                if !(parameter > 0.0 && parameter <= 1.0) {
                    return Err(EventStreamError::InvalidConfiguration(format!(
                        "exponential decay parameter must be in (0, 1], got {}",
                        parameter
                    )));
                }
                Ok(DecayPolicy::Exponential {
                    decay_factor: parameter.powf(1.0 / k),
                })
            }
            DecayPolicyKind::Threshold => {
                if !(parameter >= 0.0) {
                    return Err(EventStreamError::InvalidConfiguration(format!(
                        "threshold parameter must be non-negative, got {}",
                        parameter
                    )));
                }
                Ok(DecayPolicy::Threshold {
                    threshold: SURFACE_MAX - k * parameter,
                })
            }
            DecayPolicyKind::Competitive => Ok(DecayPolicy::Competitive {
                rank_ceiling: k * k,
            }),
            DecayPolicyKind::Accumulative => Ok(DecayPolicy::Accumulative),
            DecayPolicyKind::Latest => Ok(DecayPolicy::Latest),
            DecayPolicyKind::Binary => Ok(DecayPolicy::Binary),
        }
    }

    pub fn kind(&self) -> DecayPolicyKind {
        match self {
            DecayPolicy::Exponential { .. } => DecayPolicyKind::Exponential,
            DecayPolicy::Threshold { .. } => DecayPolicyKind::Threshold,
            DecayPolicy::Competitive { .. } => DecayPolicyKind::Competitive,
            DecayPolicy::Accumulative => DecayPolicyKind::Accumulative,
            DecayPolicy::Latest => DecayPolicyKind::Latest,
            DecayPolicy::Binary => DecayPolicyKind::Binary,
        }
    }

    /// Whether an update touches cells other than the centre.
    pub fn uses_kernel(&self) -> bool {
        matches!(
            self,
            DecayPolicy::Exponential { .. }
                | DecayPolicy::Threshold { .. }
                | DecayPolicy::Competitive { .. }
        )
    }
}

/// Dense decaying grid for one channel.
#[derive(Debug, Clone)]
pub struct DecayingSurface {
    grid: Array2<f64>,
    width: usize,
    height: usize,
    kernel_size: usize,
    half_kernel: usize,
    policy: DecayPolicy,
    last_decay: Option<Stamp>,
}

impl DecayingSurface {
    pub fn new(width: usize, height: usize, kernel_size: usize, policy: DecayPolicy) -> Result<Self> {
        check_dimensions(width, height)?;
        if kernel_size == 0 {
            return Err(EventStreamError::InvalidConfiguration(
                "kernel size must be positive".to_string(),
            ));
        }
        let half_kernel = kernel_size / 2;
        Ok(Self {
            grid: Array2::zeros((height + 2 * half_kernel, width + 2 * half_kernel)),
            width,
            height,
            kernel_size,
            half_kernel,
            policy,
            last_decay: None,
        })
    }

    /// Build from a policy name and parameter.
    pub fn with_kind(
        width: usize,
        height: usize,
        kernel_size: usize,
        kind: DecayPolicyKind,
        parameter: f64,
    ) -> Result<Self> {
        let policy = DecayPolicy::new(kind, kernel_size, parameter)?;
        Self::new(width, height, kernel_size, policy)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn policy(&self) -> DecayPolicy {
        self.policy
    }

    /// Apply one event. Returns `false` (and changes nothing) when the
    /// coordinate lies outside the grid.
    pub fn update(&mut self, x: usize, y: usize, stamp: Stamp, polarity: bool) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let k = self.kernel_size;
        // padded coordinates of the centre cell
        let cx = x + self.half_kernel;
        let cy = y + self.half_kernel;

        match self.policy {
            DecayPolicy::Exponential { decay_factor } => {
                self.grid
                    .slice_mut(s![y..y + k, x..x + k])
                    .mapv_inplace(|v| v * decay_factor);
                self.grid[[cy, cx]] = SURFACE_MAX;
            }
            DecayPolicy::Threshold { threshold } => {
                self.grid
                    .slice_mut(s![y..y + k, x..x + k])
                    .mapv_inplace(|v| if v < threshold { 0.0 } else { v - 1.0 });
                self.grid[[cy, cx]] = SURFACE_MAX;
            }
            DecayPolicy::Competitive { rank_ceiling } => {
                let centre = self.grid[[cy, cx]];
                self.grid
                    .slice_mut(s![y..y + k, x..x + k])
                    .mapv_inplace(|v| if v > centre { v - 1.0 } else { v });
                self.grid[[cy, cx]] = rank_ceiling;
            }
            DecayPolicy::Accumulative => {
                if polarity {
                    self.grid[[cy, cx]] -= 1.0;
                } else {
                    self.grid[[cy, cx]] += 1.0;
                }
            }
            DecayPolicy::Latest => {
                self.grid[[cy, cx]] = stamp.ticks() as f64;
            }
            DecayPolicy::Binary => {
                self.grid[[cy, cx]] = SURFACE_MAX;
            }
        }
        true
    }

    pub fn apply(&mut self, event: &Event) -> bool {
        self.update(event.x as usize, event.y as usize, event.stamp, event.polarity)
    }

    /// Multiply the whole grid by `exp(-rate_per_second * dt)`, where `dt` is
    /// the virtual time since the previous call. The first call only records
    /// `now`.
    pub fn temporal_decay(&mut self, now: Stamp, rate_per_second: f64) {
        if let Some(previous) = self.last_decay {
            let dt = evsync_structures::ticks_to_seconds(Stamp::elapsed(previous, now) as u64);
            let factor = (-rate_per_second * dt).exp();
            self.grid.mapv_inplace(|v| v * factor);
        }
        self.last_decay = Some(now);
    }

    /// Gaussian blur with an odd kernel of `kernel` pixels (even values are
    /// rounded up). Borders are replicated. Kernels of one pixel or less are
    /// a no-op.
    pub fn spatial_decay(&mut self, kernel: usize) {
        if kernel <= 1 {
            return;
        }
        let kernel = kernel | 1;
        let weights = gaussian_weights(kernel);
        let half = (kernel / 2) as isize;
        let (rows, cols) = self.grid.dim();

        let mut horizontal = Array2::<f64>::zeros((rows, cols));
        for r in 0..rows {
            for c in 0..cols {
                let mut acc = 0.0;
                for (i, w) in weights.iter().enumerate() {
                    let cc = (c as isize + i as isize - half).clamp(0, cols as isize - 1) as usize;
                    acc += w * self.grid[[r, cc]];
                }
                horizontal[[r, c]] = acc;
            }
        }
        for r in 0..rows {
            for c in 0..cols {
                let mut acc = 0.0;
                for (i, w) in weights.iter().enumerate() {
                    let rr = (r as isize + i as isize - half).clamp(0, rows as isize - 1) as usize;
                    acc += w * horizontal[[rr, c]];
                }
                self.grid[[r, c]] = acc;
            }
        }
    }

    pub fn reset(&mut self) {
        self.grid.fill(0.0);
        self.last_decay = None;
    }

    /// Cell value at `(x, y)`, or `None` outside the grid.
    pub fn value(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.grid[[y + self.half_kernel, x + self.half_kernel]])
    }

    /// Borrowed `height x width` view (row = y, column = x).
    pub fn view(&self) -> ArrayView2<'_, f64> {
        let h = self.half_kernel;
        self.grid.slice(s![h..h + self.height, h..h + self.width])
    }

    /// Owned copy of [`Self::view`].
    pub fn snapshot(&self) -> Array2<f64> {
        self.view().to_owned()
    }
}

fn gaussian_weights(kernel: usize) -> Vec<f64> {
    let sigma = 0.3 * ((kernel as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (kernel / 2) as f64;
    let mut weights: Vec<f64> = (0..kernel)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= total;
    }
    weights
}
