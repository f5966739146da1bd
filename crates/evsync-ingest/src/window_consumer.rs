// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Window Consumer
//!
//! Dedicated thread that drains a [`BatchQueue`] into per-channel
//! [`FixedWindow`]s.
//!
//! ## Strict update period
//! With a period configured, ingestion counts the virtual time it consumes.
//! Once the count strictly exceeds the period the thread parks (queued
//! batches stay queued) until a `query_window` call releases it, then starts
//! counting the next period. A query only releases a thread that is already
//! parked; queries issued mid-period grant nothing in advance, so each
//! period's data is read exactly once.

use crate::queue::{BatchQueue, QueueStats};
use crate::worker::{ConsumerState, Worker};
use evsync_structures::{
    ArrivalStamp, Event, EventBatch, EventStreamError, Result, Stamp, MAX_STAMP,
};
use evsync_surfaces::{FixedWindow, WindowBound};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConsumerConfig {
    pub channel_count: usize,
    pub bound: WindowBound,
    /// Virtual ticks per strict update period; `None` ingests freely
    pub strict_period_ticks: Option<u32>,
}

impl Default for WindowConsumerConfig {
    fn default() -> Self {
        Self {
            channel_count: 2,
            bound: WindowBound::Count(1000),
            strict_period_ticks: None,
        }
    }
}

impl WindowConsumerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 || self.channel_count > u8::MAX as usize + 1 {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "channel count must be in 1..=256, got {}",
                self.channel_count
            )));
        }
        self.bound.validate()?;
        validate_period(self.strict_period_ticks)
    }
}

pub(crate) fn validate_period(period: Option<u32>) -> Result<()> {
    match period {
        Some(0) => Err(EventStreamError::InvalidConfiguration(
            "strict update period must be positive".to_string(),
        )),
        Some(ticks) if ticks >= MAX_STAMP / 2 => Err(EventStreamError::InvalidConfiguration(
            format!(
                "strict update period {} ticks must be below {}",
                ticks,
                MAX_STAMP / 2
            ),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug)]
struct PeriodClock {
    period: u32,
    anchor: Option<Stamp>,
    elapsed: u64,
}

impl PeriodClock {
    /// Account for a batch; true when the period boundary has been crossed.
    fn advance(&mut self, batch: &EventBatch) -> bool {
        let (Some(first), Some(last)) = (batch.first_stamp(), batch.last_stamp()) else {
            return false;
        };
        let from = self.anchor.unwrap_or(first);
        self.elapsed += Stamp::elapsed(from, last) as u64;
        self.anchor = Some(last);
        if self.elapsed > self.period as u64 {
            self.elapsed = 0;
            return true;
        }
        false
    }
}

#[derive(Debug)]
struct WindowInner {
    windows: Vec<FixedWindow>,
    updated: bool,
    arrival: Option<ArrivalStamp>,
    vstamp: Option<Stamp>,
    clock: Option<PeriodClock>,
    paused: bool,
    permit: bool,
    stopping: bool,
    events_ingested: u64,
    events_skipped: u64,
    periods_completed: u64,
}

impl WindowInner {
    fn ingest(&mut self, batch: &EventBatch) {
        for event in batch.events() {
            match self.windows.get_mut(event.channel as usize) {
                Some(window) => {
                    window.push(*event);
                    self.events_ingested += 1;
                }
                None => self.events_skipped += 1,
            }
        }
        if let Some(arrival) = batch.arrival() {
            self.arrival = Some(arrival);
        }
        if let Some(last) = batch.last_stamp() {
            self.vstamp = Some(last);
        }
        self.updated = true;
    }
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<WindowInner>,
    released: Condvar,
}

#[derive(Debug)]
pub struct WindowConsumer {
    config: WindowConsumerConfig,
    shared: Arc<Shared>,
    queue: BatchQueue,
    worker: Worker,
}

impl WindowConsumer {
    pub fn new(config: WindowConsumerConfig, queue: BatchQueue) -> Result<Self> {
        config.validate()?;
        let windows = (0..config.channel_count)
            .map(|_| FixedWindow::new(config.bound))
            .collect::<Result<Vec<_>>>()?;
        let clock = config.strict_period_ticks.map(|period| PeriodClock {
            period,
            anchor: None,
            elapsed: 0,
        });
        let thread_name = format!("evsync-window-{}", queue.name());
        Ok(Self {
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(WindowInner {
                    windows,
                    updated: false,
                    arrival: None,
                    vstamp: None,
                    clock,
                    paused: false,
                    permit: false,
                    stopping: false,
                    events_ingested: 0,
                    events_skipped: 0,
                    periods_completed: 0,
                }),
                released: Condvar::new(),
            }),
            queue,
            worker: Worker::new("WINDOW-CONSUMER", thread_name),
        })
    }

    pub fn config(&self) -> &WindowConsumerConfig {
        &self.config
    }

    pub fn state(&self) -> ConsumerState {
        self.worker.state()
    }

    pub fn start(&mut self) -> Result<()> {
        let shared = self.shared.clone();
        let queue = self.queue.clone();
        self.worker.start(move |state| {
            while state.is_running() {
                let Some(batch) = queue.take() else { break };
                let mut inner = shared.inner.lock();
                inner.ingest(&batch);
                trace!("[WINDOW-CONSUMER] ingested {} event(s)", batch.len());

                let crossed = match inner.clock.as_mut() {
                    Some(clock) => clock.advance(&batch),
                    None => false,
                };
                if !crossed {
                    continue;
                }
                inner.periods_completed += 1;
                inner.paused = true;
                inner.permit = false;
                while !inner.permit && !inner.stopping {
                    shared.released.wait(&mut inner);
                }
                inner.paused = false;
                inner.permit = false;
            }
            debug!("[WINDOW-CONSUMER] ingestion loop exited");
        })
    }

    pub fn stop(&mut self) {
        let shared = self.shared.clone();
        self.worker.stop(&self.queue, move || {
            shared.inner.lock().stopping = true;
            shared.released.notify_all();
        });
    }

    pub fn queue(&self) -> &BatchQueue {
        &self.queue
    }

    /// Copy of a channel's window, oldest first. Clears the updated flag and
    /// releases ingestion if it is parked at a period boundary.
    pub fn query_window(&self, channel: usize) -> Result<Vec<Event>> {
        let mut inner = self.shared.inner.lock();
        let count = inner.windows.len();
        let snapshot = inner
            .windows
            .get(channel)
            .map(|w| w.snapshot())
            .ok_or_else(|| {
                EventStreamError::InvalidArgument(format!(
                    "channel {} (configured channels: {})",
                    channel, count
                ))
            })?;
        inner.updated = false;
        if inner.paused && !inner.permit {
            inner.permit = true;
            self.shared.released.notify_one();
        }
        Ok(snapshot)
    }

    /// Envelope and virtual stamp of the newest ingested batch.
    pub fn query_stamps(&self) -> (Option<ArrivalStamp>, Option<Stamp>) {
        let inner = self.shared.inner.lock();
        (inner.arrival, inner.vstamp)
    }

    pub fn has_updated(&self) -> bool {
        self.shared.inner.lock().updated
    }

    /// Ingestion is parked at a period boundary waiting for a query.
    pub fn is_paused(&self) -> bool {
        self.shared.inner.lock().paused
    }

    pub fn periods_completed(&self) -> u64 {
        self.shared.inner.lock().periods_completed
    }

    pub fn events_ingested(&self) -> u64 {
        self.shared.inner.lock().events_ingested
    }

    pub fn events_skipped(&self) -> u64 {
        self.shared.inner.lock().events_skipped
    }

    pub fn backlog(&self) -> usize {
        self.queue.stats().pending_batches
    }

    pub fn delay_stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl Drop for WindowConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(stamps: &[u32]) -> EventBatch {
        EventBatch::new(
            stamps.iter().map(|&t| Event::at(1, 2, 0, false, t)).collect(),
            None,
        )
    }

    #[test]
    fn test_period_clock_crosses_strictly() {
        let mut clock = PeriodClock {
            period: 100,
            anchor: None,
            elapsed: 0,
        };
        assert!(!clock.advance(&batch(&[1_000, 1_060])));
        // exactly at the period is not a crossing
        assert!(!clock.advance(&batch(&[1_080, 1_100])));
        assert!(clock.advance(&batch(&[1_101])));
        assert!(!clock.advance(&batch(&[])));
    }

    #[test]
    fn test_period_clock_wraps() {
        let mut clock = PeriodClock {
            period: 100,
            anchor: None,
            elapsed: 0,
        };
        assert!(!clock.advance(&batch(&[MAX_STAMP - 40, MAX_STAMP - 1])));
        assert!(clock.advance(&batch(&[10, 70])));
    }

    #[test]
    fn test_config_validation() {
        let mut cfg = WindowConsumerConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.strict_period_ticks = Some(0);
        assert!(cfg.validate().is_err());
        cfg.strict_period_ticks = Some(MAX_STAMP / 2);
        assert!(cfg.validate().is_err());
        cfg.strict_period_ticks = None;
        cfg.bound = WindowBound::Count(0);
        assert!(WindowConsumer::new(cfg, BatchQueue::new(0)).is_err());
    }

    #[test]
    fn test_query_without_pause_grants_nothing() {
        let consumer = WindowConsumer::new(
            WindowConsumerConfig {
                channel_count: 1,
                bound: WindowBound::Count(3),
                strict_period_ticks: Some(10),
            },
            BatchQueue::new(0),
        )
        .unwrap();
        assert!(consumer.query_window(0).unwrap().is_empty());
        assert!(!consumer.shared.inner.lock().permit);
        assert!(matches!(
            consumer.query_window(1),
            Err(EventStreamError::InvalidArgument(_))
        ));
    }
}
