// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evsync-structures
//!
//! Shared data types for the event ingestion engine:
//! - [`Stamp`]: the sensor's wrapping virtual-time counter and the only place
//!   where two timestamps are ever subtracted
//! - [`Event`]: one spatial sample (pixel, channel, polarity, stamp)
//! - [`EventBatch`]: an ordered group of events decoded from one inbound message
//! - [`EventStreamError`]: the error type shared by every evsync crate

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod batch;
pub mod error;
pub mod event;
pub mod stamp;

pub use batch::{ArrivalStamp, EventBatch};
pub use error::{EventStreamError, Result};
pub use event::Event;
pub use stamp::{seconds_to_ticks, ticks_to_seconds, Stamp, MAX_STAMP, TICKS_PER_SECOND, TICK_SECONDS};
