// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Surface Consumer
//!
//! Dedicated thread that drains a [`BatchQueue`] into per-channel decaying
//! surfaces and event histories, and answers queries from other threads.
//!
//! ## CPU delay
//! Each channel carries a budget in ticks: how far the newest ingested event
//! runs ahead of what the query side has caught up with. Ingestion adds the
//! virtual time each batch covers; every query drains the wall time elapsed
//! since that channel's previous query. The budget is clamped to
//! `[0, max_cpu_delay]`. Region queries skip the newest `budget` ticks so
//! callers never see data that is still in flight relative to real time.
//!
//! Sitting at the maximum is reported through [`DelayStatus`], never as an
//! error.

use crate::queue::{BatchQueue, QueueStats};
use crate::worker::{ConsumerState, Worker};
use evsync_structures::{
    seconds_to_ticks, ArrivalStamp, Event, EventBatch, EventStreamError, Result, Stamp,
    MAX_STAMP, TICKS_PER_SECOND, TICK_SECONDS,
};
use evsync_surfaces::{DecayPolicy, DecayPolicyKind, DecayingSurface, EventHistory, QueryLimit, Roi};
use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Query-side drain runs slightly faster than real time so a budget sitting
/// at zero stays there.
const DRAIN_SCALE: f64 = 1.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConsumerConfig {
    pub width: usize,
    pub height: usize,
    pub channel_count: usize,
    /// `None` keeps only the event history (no decay grid)
    pub policy: Option<DecayPolicyKind>,
    pub kernel_size: usize,
    pub parameter: f64,
    /// Age beyond which history events are discarded
    pub history_seconds: f64,
    pub max_cpu_delay_seconds: f64,
    /// Queue depth at which the consumer drains several batches per lock
    pub catch_up_backlog: usize,
}

impl Default for SurfaceConsumerConfig {
    fn default() -> Self {
        Self {
            width: 304,
            height: 240,
            channel_count: 2,
            policy: Some(DecayPolicyKind::Exponential),
            kernel_size: 7,
            parameter: DecayPolicyKind::Exponential.default_parameter(),
            history_seconds: 0.5,
            max_cpu_delay_seconds: 0.05,
            catch_up_backlog: 4,
        }
    }
}

impl SurfaceConsumerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 || self.channel_count > u8::MAX as usize + 1 {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "channel count must be in 1..=256, got {}",
                self.channel_count
            )));
        }
        if self.kernel_size == 0 {
            return Err(EventStreamError::InvalidConfiguration(
                "kernel size must be positive".to_string(),
            ));
        }
        if !(self.max_cpu_delay_seconds > 0.0) {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "max CPU delay must be positive, got {}",
                self.max_cpu_delay_seconds
            )));
        }
        for (name, seconds) in [
            ("max CPU delay", self.max_cpu_delay_seconds),
            ("history", self.history_seconds),
        ] {
            if seconds_to_ticks(seconds) >= (MAX_STAMP / 2) as u64 {
                return Err(EventStreamError::InvalidConfiguration(format!(
                    "{} of {}s spans half the stamp range or more",
                    name, seconds
                )));
            }
        }
        if self.catch_up_backlog == 0 {
            return Err(EventStreamError::InvalidConfiguration(
                "catch-up backlog must be positive".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "sensor dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if let Some(kind) = self.policy {
            DecayPolicy::new(kind, self.kernel_size, self.parameter)?;
        }
        Ok(())
    }

    fn max_delay_ticks(&self) -> f64 {
        self.max_cpu_delay_seconds * TICKS_PER_SECOND
    }
}

/// CPU-delay condition of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayStatus {
    pub delay_seconds: f64,
    /// Budget currently pinned at the configured maximum
    pub saturated: bool,
    /// How many batches hit the maximum since start
    pub saturation_count: u64,
}

#[derive(Debug)]
struct ChannelState {
    surface: Option<DecayingSurface>,
    history: EventHistory,
    delay_ticks: f64,
    saturated: bool,
    saturation_count: u64,
    newest: Option<Stamp>,
    last_drain: Instant,
}

impl ChannelState {
    fn grow(&mut self, ticks: u32, max_ticks: f64) -> bool {
        self.delay_ticks += ticks as f64;
        if self.delay_ticks >= max_ticks {
            self.delay_ticks = max_ticks;
            self.saturated = true;
            self.saturation_count += 1;
            return true;
        }
        false
    }

    fn drain(&mut self, now: Instant, max_ticks: f64) {
        let elapsed = now.saturating_duration_since(self.last_drain).as_secs_f64();
        self.last_drain = now;
        self.delay_ticks =
            (self.delay_ticks - elapsed * TICKS_PER_SECOND * DRAIN_SCALE).clamp(0.0, max_ticks);
        self.saturated = self.delay_ticks >= max_ticks;
    }

    fn status(&self) -> DelayStatus {
        DelayStatus {
            delay_seconds: self.delay_ticks * TICK_SECONDS,
            saturated: self.saturated,
            saturation_count: self.saturation_count,
        }
    }
}

#[derive(Debug)]
struct ConsumerInner {
    channels: Vec<ChannelState>,
    arrival: Option<ArrivalStamp>,
    events_ingested: u64,
    events_skipped: u64,
    batches_ingested: u64,
    saturation_warnings: u64,
}

impl ConsumerInner {
    fn channel(&self, channel: usize) -> Result<&ChannelState> {
        let count = self.channels.len();
        self.channels.get(channel).ok_or_else(|| {
            EventStreamError::InvalidArgument(format!(
                "channel {} (configured channels: {})",
                channel, count
            ))
        })
    }

    fn channel_mut(&mut self, channel: usize) -> Result<&mut ChannelState> {
        let count = self.channels.len();
        self.channels.get_mut(channel).ok_or_else(|| {
            EventStreamError::InvalidArgument(format!(
                "channel {} (configured channels: {})",
                channel, count
            ))
        })
    }

    fn ingest(&mut self, batch: EventBatch, config: &SurfaceConsumerConfig) {
        let max_ticks = config.max_delay_ticks();
        if let Some(arrival) = batch.arrival() {
            self.arrival = Some(arrival);
        }

        // first and last stamp each channel saw in this batch
        let mut bounds: Vec<Option<(Stamp, Stamp)>> = vec![None; self.channels.len()];
        for event in batch.events() {
            let index = event.channel as usize;
            let Some(state) = self.channels.get_mut(index) else {
                self.events_skipped += 1;
                continue;
            };
            if event.x as usize >= config.width || event.y as usize >= config.height {
                self.events_skipped += 1;
                continue;
            }
            if let Some(surface) = state.surface.as_mut() {
                surface.apply(event);
            }
            state.history.push(*event);
            bounds[index] = match bounds[index] {
                None => Some((event.stamp, event.stamp)),
                Some((first, _)) => Some((first, event.stamp)),
            };
            self.events_ingested += 1;
        }

        for (state, bound) in self.channels.iter_mut().zip(bounds) {
            let Some((first, last)) = bound else { continue };
            let advance = match state.newest {
                None => Stamp::elapsed(first, last),
                Some(previous) => Stamp::elapsed(previous, last),
            };
            state.newest = Some(last);
            if state.grow(advance, max_ticks) {
                self.saturation_warnings += 1;
                let n = self.saturation_warnings;
                if n == 1 || n % 1000 == 0 {
                    warn!(
                        "[SURFACE-CONSUMER] CPU delay pinned at {:.3}s ({} time(s)); queries are falling behind ingestion",
                        config.max_cpu_delay_seconds, n
                    );
                }
            }
        }
        self.batches_ingested += 1;
    }
}

#[derive(Debug)]
struct Shared {
    config: SurfaceConsumerConfig,
    inner: Mutex<ConsumerInner>,
}

/// Consumer thread feeding decaying surfaces and event histories.
#[derive(Debug)]
pub struct SurfaceConsumer {
    shared: Arc<Shared>,
    queue: BatchQueue,
    worker: Worker,
}

impl SurfaceConsumer {
    /// Build every per-channel structure. Fails before any thread exists.
    pub fn new(config: SurfaceConsumerConfig, queue: BatchQueue) -> Result<Self> {
        config.validate()?;
        let policy = match config.policy {
            Some(kind) => Some(DecayPolicy::new(kind, config.kernel_size, config.parameter)?),
            None => None,
        };
        let retention = seconds_to_ticks(config.history_seconds) as u32;
        let now = Instant::now();
        let mut channels = Vec::with_capacity(config.channel_count);
        for _ in 0..config.channel_count {
            let surface = match policy {
                Some(policy) => Some(DecayingSurface::new(
                    config.width,
                    config.height,
                    config.kernel_size,
                    policy,
                )?),
                None => None,
            };
            channels.push(ChannelState {
                surface,
                history: EventHistory::new(retention)?,
                delay_ticks: 0.0,
                saturated: false,
                saturation_count: 0,
                newest: None,
                last_drain: now,
            });
        }

        let thread_name = format!("evsync-surface-{}", queue.name());
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(ConsumerInner {
                    channels,
                    arrival: None,
                    events_ingested: 0,
                    events_skipped: 0,
                    batches_ingested: 0,
                    saturation_warnings: 0,
                }),
            }),
            queue,
            worker: Worker::new("SURFACE-CONSUMER", thread_name),
        })
    }

    pub fn config(&self) -> &SurfaceConsumerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConsumerState {
        self.worker.state()
    }

    pub fn start(&mut self) -> Result<()> {
        let shared = self.shared.clone();
        let queue = self.queue.clone();
        {
            // drain clocks start with the thread
            let now = Instant::now();
            for channel in self.shared.inner.lock().channels.iter_mut() {
                channel.last_drain = now;
            }
        }
        self.worker.start(move |state| {
            let catch_up = shared.config.catch_up_backlog;
            while state.is_running() {
                let Some(batch) = queue.take() else { break };
                let mut inner = shared.inner.lock();
                inner.ingest(batch, &shared.config);
                if queue.queued() >= catch_up {
                    let mut drained = 0;
                    while drained < catch_up {
                        let Some(next) = queue.try_take() else { break };
                        inner.ingest(next, &shared.config);
                        drained += 1;
                    }
                    trace!("[SURFACE-CONSUMER] caught up {} extra batch(es)", drained);
                }
            }
            debug!("[SURFACE-CONSUMER] ingestion loop exited");
        })
    }

    /// Stop the thread. Surfaces and histories stay queryable.
    pub fn stop(&mut self) {
        self.worker.stop(&self.queue, || {});
    }

    pub fn queue(&self) -> &BatchQueue {
        &self.queue
    }

    /// Events old enough to be outside the CPU-delay slice, oldest first.
    pub fn query_roi(&self, channel: usize, limit: QueryLimit, roi: Option<Roi>) -> Result<Vec<Event>> {
        let max_ticks = self.shared.config.max_delay_ticks();
        let mut inner = self.shared.inner.lock();
        let state = inner.channel_mut(channel)?;
        state.drain(Instant::now(), max_ticks);
        let offset = state.delay_ticks.round() as u32;
        Ok(state.history.query(offset, limit, roi))
    }

    /// Whole-sensor counterpart of [`Self::query_roi`]: drains the budget and
    /// skips the in-flight slice.
    pub fn query_window(&self, channel: usize, limit: QueryLimit) -> Result<Vec<Event>> {
        self.query_roi(channel, limit, None)
    }

    /// Most recent events regardless of CPU delay, oldest first. Leaves the
    /// budget untouched.
    pub fn query_latest(&self, channel: usize, limit: QueryLimit) -> Result<Vec<Event>> {
        let inner = self.shared.inner.lock();
        Ok(inner.channel(channel)?.history.query(0, limit, None))
    }

    /// Copy of the channel's decay grid (`height x width`).
    pub fn surface(&self, channel: usize) -> Result<Array2<f64>> {
        let inner = self.shared.inner.lock();
        inner
            .channel(channel)?
            .surface
            .as_ref()
            .map(|s| s.snapshot())
            .ok_or_else(|| {
                EventStreamError::InvalidArgument("no decay policy configured".to_string())
            })
    }

    /// Current CPU delay of a channel in seconds.
    pub fn query_delay(&self, channel: usize) -> Result<f64> {
        Ok(self.delay_status(channel)?.delay_seconds)
    }

    pub fn delay_status(&self, channel: usize) -> Result<DelayStatus> {
        let inner = self.shared.inner.lock();
        Ok(inner.channel(channel)?.status())
    }

    /// Newest stamp of the channel moved back by its CPU delay.
    pub fn query_vstamp(&self, channel: usize) -> Result<Option<Stamp>> {
        let inner = self.shared.inner.lock();
        let state = inner.channel(channel)?;
        Ok(state
            .newest
            .map(|s| s.wrapping_sub(state.delay_ticks.round() as u64)))
    }

    /// Envelope of the most recent batch that carried one.
    pub fn query_arrival(&self) -> Option<ArrivalStamp> {
        self.shared.inner.lock().arrival
    }

    pub fn backlog(&self) -> usize {
        self.queue.stats().pending_batches
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn events_ingested(&self) -> u64 {
        self.shared.inner.lock().events_ingested
    }

    /// Events dropped for an unknown channel or an out-of-range coordinate.
    pub fn events_skipped(&self) -> u64 {
        self.shared.inner.lock().events_skipped
    }

    pub fn batches_ingested(&self) -> u64 {
        self.shared.inner.lock().batches_ingested
    }
}

impl Drop for SurfaceConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}
