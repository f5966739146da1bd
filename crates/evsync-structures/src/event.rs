// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::stamp::Stamp;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Single address event: a pixel that changed, on which camera, which way,
/// and when (in virtual ticks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub x: u16,
    pub y: u16,
    /// Camera or modality index used to route the event to a per-channel structure
    pub channel: u8,
    pub polarity: bool,
    pub stamp: Stamp,
}

impl Event {
    pub fn new(x: u16, y: u16, channel: u8, polarity: bool, stamp: Stamp) -> Self {
        Self {
            x,
            y,
            channel,
            polarity,
            stamp,
        }
    }

    /// Convenience constructor taking the raw counter value.
    pub fn at(x: u16, y: u16, channel: u8, polarity: bool, raw_stamp: u32) -> Self {
        Self::new(x, y, channel, polarity, Stamp::new(raw_stamp))
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.x, self.y, self.channel, self.polarity as u8, self.stamp
        )
    }
}
