// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Multi-Stream Synchronizer
//!
//! Owns one [`WindowConsumer`] per stream label (opened lazily) and merges
//! their independent clocks into one reference `(wall time, virtual stamp)`.
//!
//! ## Merged clock
//! Before any stream has delivered a transport envelope the reference simply
//! follows each stream's newest virtual stamp. Once envelopes exist, a
//! stream's pair is adopted when its wall time is newer than the reference,
//! or when the reference is more than `stale_reference_seconds` ahead of it
//! (the reference clock jumped and has to be re-seeded). The merge is
//! best-effort recency, not a total order.

use crate::queue::{BatchQueue, QueueStats};
use crate::window_consumer::{validate_period, WindowConsumer, WindowConsumerConfig};
use evsync_structures::{Event, EventStreamError, Result, Stamp};
use evsync_surfaces::WindowBound;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronizerConfig {
    pub channel_count: usize,
    pub bound: WindowBound,
    /// Capacity of each per-stream queue (0 = unbounded)
    pub queue_capacity: usize,
    pub strict_period_ticks: Option<u32>,
    pub stale_reference_seconds: f64,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            bound: WindowBound::Count(1000),
            queue_capacity: 0,
            strict_period_ticks: None,
            stale_reference_seconds: 5.0,
        }
    }
}

impl SynchronizerConfig {
    pub fn validate(&self) -> Result<()> {
        self.consumer_config(self.strict_period_ticks).validate()?;
        if !(self.stale_reference_seconds > 0.0) {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "stale reference threshold must be positive, got {}",
                self.stale_reference_seconds
            )));
        }
        Ok(())
    }

    fn consumer_config(&self, strict_period_ticks: Option<u32>) -> WindowConsumerConfig {
        WindowConsumerConfig {
            channel_count: self.channel_count,
            bound: self.bound,
            strict_period_ticks,
        }
    }
}

/// Merged time reference across all streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStamps {
    pub wall_seconds: Option<f64>,
    pub vstamp: Option<Stamp>,
}

impl ReferenceStamps {
    fn consider(&mut self, wall: Option<f64>, vstamp: Option<Stamp>, stale_seconds: f64) {
        match (self.wall_seconds, wall) {
            (None, None) => {
                if vstamp.is_some() {
                    self.vstamp = vstamp;
                }
            }
            (None, Some(w)) => {
                self.wall_seconds = Some(w);
                self.vstamp = vstamp;
            }
            (Some(reference), Some(w)) if w > reference || w < reference - stale_seconds => {
                self.wall_seconds = Some(w);
                self.vstamp = vstamp;
            }
            _ => {}
        }
    }
}

#[derive(Debug)]
struct SyncState {
    streams: BTreeMap<String, WindowConsumer>,
    strict_period_ticks: Option<u32>,
    reference: ReferenceStamps,
    closed: bool,
}

impl SyncState {
    fn refresh_reference(&mut self, stale_seconds: f64) {
        for consumer in self.streams.values() {
            let (arrival, vstamp) = consumer.query_stamps();
            self.reference
                .consider(arrival.map(|a| a.wall_seconds), vstamp, stale_seconds);
        }
    }
}

#[derive(Debug)]
pub struct StreamSynchronizer {
    config: SynchronizerConfig,
    state: Mutex<SyncState>,
}

impl StreamSynchronizer {
    pub fn new(config: SynchronizerConfig) -> Result<Self> {
        config.validate()?;
        let strict_period_ticks = config.strict_period_ticks;
        Ok(Self {
            config,
            state: Mutex::new(SyncState {
                streams: BTreeMap::new(),
                strict_period_ticks,
                reference: ReferenceStamps::default(),
                closed: false,
            }),
        })
    }

    pub fn config(&self) -> &SynchronizerConfig {
        &self.config
    }

    /// Queue handle for `label`, starting its consumer on first use.
    pub fn open(&self, label: &str) -> Result<BatchQueue> {
        if label.is_empty() {
            return Err(EventStreamError::InvalidArgument(
                "stream label must not be empty".to_string(),
            ));
        }
        let mut state = self.state.lock();
        if state.closed {
            return Err(EventStreamError::InvalidArgument(format!(
                "synchronizer closed, cannot open '{}'",
                label
            )));
        }
        if let Some(existing) = state.streams.get(label) {
            return Ok(existing.queue().clone());
        }

        let queue = BatchQueue::named(label, self.config.queue_capacity);
        let mut consumer = WindowConsumer::new(
            self.config.consumer_config(state.strict_period_ticks),
            queue.clone(),
        )?;
        consumer.start()?;
        info!(
            "[STREAM-SYNC] Opened stream '{}' ({} stream(s) total)",
            label,
            state.streams.len() + 1
        );
        state.streams.insert(label.to_string(), consumer);
        Ok(queue)
    }

    /// Window of `channel` on stream `label`, after refreshing the merged clock.
    pub fn query_window(&self, label: &str, channel: usize) -> Result<Vec<Event>> {
        let mut state = self.state.lock();
        state.refresh_reference(self.config.stale_reference_seconds);
        let consumer = state
            .streams
            .get(label)
            .ok_or_else(|| EventStreamError::InvalidArgument(format!("unknown stream '{}'", label)))?;
        consumer.query_window(channel)
    }

    /// Any stream has data not yet queried; always true with a strict period.
    pub fn has_updated(&self) -> bool {
        let state = self.state.lock();
        if state.strict_period_ticks.is_some() {
            return true;
        }
        state.streams.values().any(|c| c.has_updated())
    }

    /// Largest unprocessed batch count across streams.
    pub fn max_backlog(&self) -> usize {
        let state = self.state.lock();
        state
            .streams
            .values()
            .map(|c| c.backlog())
            .max()
            .unwrap_or(0)
    }

    pub fn delay_stats(&self) -> BTreeMap<String, QueueStats> {
        let state = self.state.lock();
        state
            .streams
            .iter()
            .map(|(label, c)| (label.clone(), c.delay_stats()))
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.state.lock().streams.keys().cloned().collect()
    }

    /// Refresh and return the merged clock.
    pub fn reference_stamps(&self) -> ReferenceStamps {
        let mut state = self.state.lock();
        state.refresh_reference(self.config.stale_reference_seconds);
        state.reference
    }

    /// Period applied to streams opened after this call.
    pub fn set_strict_update_period(&self, period_ticks: Option<u32>) -> Result<()> {
        validate_period(period_ticks)?;
        self.state.lock().strict_period_ticks = period_ticks;
        debug!("[STREAM-SYNC] strict update period set to {:?} ticks", period_ticks);
        Ok(())
    }

    /// Stop every consumer. Windows stay readable; no stream can be opened afterwards.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        for consumer in state.streams.values_mut() {
            consumer.stop();
        }
        info!("[STREAM-SYNC] Closed {} stream(s)", state.streams.len());
    }
}

impl Drop for StreamSynchronizer {
    fn drop(&mut self) {
        self.close();
    }
}
