// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evsync-surfaces
//!
//! Single-channel event representations. None of these types lock anything:
//! each instance is owned and mutated by one consumer thread, and the
//! consumer's own mutex serialises queries against updates.
//!
//! - [`DecayingSurface`]: dense grid updated per event under a [`DecayPolicy`]
//! - [`FixedWindow`]: most recent N events or most recent T ticks of events
//! - [`EventHistory`]: time-ordered history answering offset/ROI queries
//! - [`ReceptiveFieldSurface`]: ring buffers of recent points per receptive field

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest accepted sensor dimension; keeps a misconfigured grid from
/// allocating gigabytes.
pub const MAX_SENSOR_DIM: usize = 32768;

pub mod decay;
pub mod history;
pub mod receptive_field;
pub mod window;

pub use decay::{DecayPolicy, DecayPolicyKind, DecayingSurface, SURFACE_MAX};
pub use history::{EventHistory, QueryLimit, Roi};
pub use receptive_field::ReceptiveFieldSurface;
pub use window::{FixedWindow, WindowBound};

use evsync_structures::{EventStreamError, Result};

pub(crate) fn check_dimensions(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(EventStreamError::InvalidConfiguration(format!(
            "grid dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    if width > MAX_SENSOR_DIM || height > MAX_SENSOR_DIM {
        return Err(EventStreamError::InvalidConfiguration(format!(
            "grid dimensions {}x{} exceed maximum {}",
            width, height, MAX_SENSOR_DIM
        )));
    }
    Ok(())
}
