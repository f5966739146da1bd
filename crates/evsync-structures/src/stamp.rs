// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wrapping virtual time.
//!
//! Sensors stamp events with a free-running 24-bit tick counter that wraps
//! back to zero. Every subtraction of two stamps in evsync goes through
//! [`Stamp::elapsed`], which adds the modulus back whenever the raw difference
//! is negative.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Modulus of the sensor tick counter (2^24 - 1).
pub const MAX_STAMP: u32 = 16_777_215;

/// Duration of one tick in seconds (80 ns).
pub const TICK_SECONDS: f64 = 8.0e-8;

/// Ticks per second (inverse of [`TICK_SECONDS`]).
pub const TICKS_PER_SECOND: f64 = 12_500_000.0;

/// Convert a tick count into seconds.
pub fn ticks_to_seconds(ticks: u64) -> f64 {
    ticks as f64 * TICK_SECONDS
}

/// Convert seconds into whole ticks (negative input saturates at zero).
pub fn seconds_to_ticks(seconds: f64) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * TICKS_PER_SECOND).round() as u64
}

/// A point on the wrapping virtual-time axis, always in `[0, MAX_STAMP)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Stamp(u32);

impl Stamp {
    pub const ZERO: Stamp = Stamp(0);

    /// Build a stamp from a raw counter value, reducing it modulo [`MAX_STAMP`].
    pub const fn new(raw: u32) -> Self {
        Stamp(raw % MAX_STAMP)
    }

    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// Ticks elapsed going forward from `earlier` to `later`.
    ///
    /// `dt = later - earlier`, and if that is negative the counter wrapped in
    /// between, so `MAX_STAMP` is added back. The result is always in
    /// `[0, MAX_STAMP)`.
    pub fn elapsed(earlier: Stamp, later: Stamp) -> u32 {
        let dt = later.0 as i64 - earlier.0 as i64;
        if dt < 0 {
            (dt + MAX_STAMP as i64) as u32
        } else {
            dt as u32
        }
    }

    /// Ticks elapsed from `self` until `later`.
    pub fn elapsed_until(self, later: Stamp) -> u32 {
        Stamp::elapsed(self, later)
    }

    /// Move forward by `ticks`, wrapping at [`MAX_STAMP`].
    pub fn wrapping_add(self, ticks: u64) -> Stamp {
        let step = ticks % MAX_STAMP as u64;
        Stamp(((self.0 as u64 + step) % MAX_STAMP as u64) as u32)
    }

    /// Move backward by `ticks`, wrapping at [`MAX_STAMP`].
    pub fn wrapping_sub(self, ticks: u64) -> Stamp {
        let step = (ticks % MAX_STAMP as u64) as i64;
        let mut value = self.0 as i64 - step;
        if value < 0 {
            value += MAX_STAMP as i64;
        }
        Stamp(value as u32)
    }

    pub fn as_seconds(self) -> f64 {
        ticks_to_seconds(self.0 as u64)
    }
}

impl From<u32> for Stamp {
    fn from(raw: u32) -> Self {
        Stamp::new(raw)
    }
}

impl From<Stamp> for u32 {
    fn from(stamp: Stamp) -> Self {
        stamp.0
    }
}

impl Display for Stamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_without_wrap() {
        assert_eq!(Stamp::elapsed(Stamp::new(100), Stamp::new(150)), 50);
        assert_eq!(Stamp::elapsed(Stamp::new(7), Stamp::new(7)), 0);
    }

    #[test]
    fn test_elapsed_across_wrap() {
        let earlier = Stamp::new(MAX_STAMP - 10);
        let later = Stamp::new(5);
        assert_eq!(Stamp::elapsed(earlier, later), 15);
    }

    #[test]
    fn test_elapsed_is_never_negative_over_sampled_range() {
        let samples = [0u32, 1, 2, 1000, 65_535, 8_388_607, MAX_STAMP - 2, MAX_STAMP - 1];
        for &a in &samples {
            for &b in &samples {
                let dt = Stamp::elapsed(Stamp::new(a), Stamp::new(b));
                assert!(dt < MAX_STAMP);
                let expected = ((b as i64 - a as i64).rem_euclid(MAX_STAMP as i64)) as u32;
                assert_eq!(dt, expected, "a={} b={}", a, b);
            }
        }
    }

    #[test]
    fn test_new_reduces_modulo() {
        assert_eq!(Stamp::new(MAX_STAMP).ticks(), 0);
        assert_eq!(Stamp::new(MAX_STAMP + 3).ticks(), 3);
    }

    #[test]
    fn test_wrapping_add_and_sub_are_inverse() {
        let start = Stamp::new(MAX_STAMP - 4);
        let forward = start.wrapping_add(10);
        assert_eq!(forward.ticks(), 6);
        assert_eq!(forward.wrapping_sub(10), start);
        assert_eq!(Stamp::elapsed(start, forward), 10);
    }

    #[test]
    fn test_tick_conversions() {
        assert_eq!(seconds_to_ticks(1.0), 12_500_000);
        assert_eq!(seconds_to_ticks(-3.0), 0);
        assert!((ticks_to_seconds(12_500_000) - 1.0).abs() < 1e-9);
        assert!((TICK_SECONDS * TICKS_PER_SECOND - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_deserialized_stamp_is_reduced() {
        let stamp: Stamp = serde_json::from_str(&(MAX_STAMP + 7).to_string()).unwrap();
        assert_eq!(stamp.ticks(), 7);
        assert_eq!(serde_json::to_string(&Stamp::new(42)).unwrap(), "42");
    }
}
