// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decoded event batches.
//!
//! A batch is what the decode boundary hands over for one inbound message:
//! the events in arrival order plus the transport envelope, if the producer
//! stamped one. Batches are immutable once built and are moved (never shared)
//! from producer to queue to consumer.

use crate::event::Event;
use crate::stamp::Stamp;
use serde::{Deserialize, Serialize};

/// Transport envelope attached to a batch on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrivalStamp {
    /// Monotonic message counter of the producing port
    pub sequence: u64,
    /// Wall-clock time of the envelope, in seconds
    pub wall_seconds: f64,
}

impl ArrivalStamp {
    pub fn new(sequence: u64, wall_seconds: f64) -> Self {
        Self {
            sequence,
            wall_seconds,
        }
    }

    /// Stamp the current system time.
    pub fn now(sequence: u64) -> Self {
        let wall_seconds = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self::new(sequence, wall_seconds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    events: Vec<Event>,
    arrival: Option<ArrivalStamp>,
}

impl EventBatch {
    pub fn new(events: Vec<Event>, arrival: Option<ArrivalStamp>) -> Self {
        Self { events, arrival }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn arrival(&self) -> Option<ArrivalStamp> {
        self.arrival
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first_stamp(&self) -> Option<Stamp> {
        self.events.first().map(|e| e.stamp)
    }

    pub fn last_stamp(&self) -> Option<Stamp> {
        self.events.last().map(|e| e.stamp)
    }

    /// Virtual time covered by the batch (last minus first, wrap-corrected).
    pub fn span(&self) -> u32 {
        match (self.first_stamp(), self.last_stamp()) {
            (Some(first), Some(last)) => Stamp::elapsed(first, last),
            _ => 0,
        }
    }
}
