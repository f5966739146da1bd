// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Bounded Batch Queue
//!
//! FIFO hand-off between the decode boundary (producer) and one consumer
//! thread.
//!
//! ## Contract
//! - `push` never blocks. When a capacity is set and reached, the new batch
//!   is dropped and counted; nothing is returned to the producer.
//! - `take` blocks until a batch is available or the queue is closed.
//! - The batch handed out by `take` keeps counting in the statistics (and
//!   against the capacity) until the consumer asks for the next one, calls
//!   `release_current`, or the queue closes. Statistics therefore describe
//!   everything the consumer has not finished with.
//! - After `close`, pushes are ignored and `take` returns `None` at once.

use evsync_structures::{EventBatch, TICKS_PER_SECOND, TICK_SECONDS};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Point-in-time view of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Batches queued plus the one currently held by the consumer
    pub pending_batches: usize,
    pub pending_events: u64,
    /// Sum of the pending batches' spans, in ticks
    pub pending_span_ticks: u64,
    /// Event rate of the most recent batch with a non-zero span
    pub rate_hz: f64,
    pub dropped_batches: u64,
    pub accepted_batches: u64,
}

impl QueueStats {
    pub fn pending_seconds(&self) -> f64 {
        self.pending_span_ticks as f64 * TICK_SECONDS
    }
}

impl Display for QueueStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {:.6} {:.1}",
            self.pending_batches,
            self.pending_events,
            self.pending_seconds(),
            self.rate_hz
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct BatchFootprint {
    events: u64,
    span: u64,
}

impl BatchFootprint {
    fn of(batch: &EventBatch) -> Self {
        Self {
            events: batch.len() as u64,
            span: batch.span() as u64,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    batches: VecDeque<EventBatch>,
    in_flight: Option<BatchFootprint>,
    pending_events: u64,
    pending_span: u64,
    rate_hz: f64,
    dropped: u64,
    accepted: u64,
    closed: bool,
}

impl QueueState {
    fn size(&self) -> usize {
        self.batches.len() + usize::from(self.in_flight.is_some())
    }

    fn release_in_flight(&mut self) {
        if let Some(done) = self.in_flight.take() {
            self.pending_events -= done.events;
            self.pending_span -= done.span;
        }
    }

    fn hand_out(&mut self) -> Option<EventBatch> {
        let batch = self.batches.pop_front()?;
        self.in_flight = Some(BatchFootprint::of(&batch));
        Some(batch)
    }
}

#[derive(Debug)]
struct Shared {
    name: String,
    capacity: usize,
    state: Mutex<QueueState>,
    available: Condvar,
}

/// Cloneable handle; every clone refers to the same queue.
#[derive(Debug, Clone)]
pub struct BatchQueue {
    shared: Arc<Shared>,
}

impl BatchQueue {
    /// `capacity == 0` means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self::named("batch-queue", capacity)
    }

    /// Queue with a name used in log lines.
    pub fn named(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                capacity,
                state: Mutex::new(QueueState::default()),
                available: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn push(&self, batch: EventBatch) {
        let mut state = self.shared.state.lock();
        if state.closed {
            trace!("[BATCH-QUEUE] {}: push after close ignored", self.shared.name);
            return;
        }
        let capacity = self.shared.capacity;
        if capacity > 0 && state.size() >= capacity {
            state.dropped += 1;
            let dropped = state.dropped;
            drop(state);
            if dropped == 1 || dropped % 1000 == 0 {
                warn!(
                    "[BATCH-QUEUE] {}: at capacity {}, dropped {} batch(es) so far",
                    self.shared.name, capacity, dropped
                );
            }
            return;
        }

        let footprint = BatchFootprint::of(&batch);
        state.pending_events += footprint.events;
        state.pending_span += footprint.span;
        if footprint.span > 0 {
            state.rate_hz = footprint.events as f64 / footprint.span as f64 * TICKS_PER_SECOND;
        }
        state.accepted += 1;
        state.batches.push_back(batch);
        drop(state);
        self.shared.available.notify_one();
    }

    /// Block until a batch is available. Returns `None` once the queue is closed.
    pub fn take(&self) -> Option<EventBatch> {
        let mut state = self.shared.state.lock();
        state.release_in_flight();
        loop {
            if state.closed {
                return None;
            }
            if let Some(batch) = state.hand_out() {
                return Some(batch);
            }
            self.shared.available.wait(&mut state);
        }
    }

    pub fn try_take(&self) -> Option<EventBatch> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return None;
        }
        state.release_in_flight();
        state.hand_out()
    }

    /// Like [`Self::take`], giving up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<EventBatch> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.take();
        };
        let mut state = self.shared.state.lock();
        state.release_in_flight();
        loop {
            if state.closed {
                return None;
            }
            if let Some(batch) = state.hand_out() {
                return Some(batch);
            }
            if self
                .shared
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return if state.closed { None } else { state.hand_out() };
            }
        }
    }

    /// Stop counting the batch last handed out.
    pub fn release_current(&self) {
        self.shared.state.lock().release_in_flight();
    }

    /// Wake every blocked `take` and refuse further pushes.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.release_in_flight();
        debug!(
            "[BATCH-QUEUE] {}: closed with {} batch(es) unread",
            self.shared.name,
            state.batches.len()
        );
        drop(state);
        self.shared.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Batches pushed but not yet handed to the consumer.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().batches.len()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock();
        QueueStats {
            pending_batches: state.size(),
            pending_events: state.pending_events,
            pending_span_ticks: state.pending_span,
            rate_hz: state.rate_hz,
            dropped_batches: state.dropped,
            accepted_batches: state.accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evsync_structures::Event;
    use std::thread;

    fn batch(stamps: &[u32]) -> EventBatch {
        EventBatch::new(
            stamps.iter().map(|&t| Event::at(1, 1, 0, true, t)).collect(),
            None,
        )
    }

    #[test]
    fn test_fifo_order() {
        let queue = BatchQueue::new(0);
        for i in 0..5u32 {
            queue.push(batch(&[i * 10, i * 10 + 5]));
        }
        for i in 0..5u32 {
            let b = queue.take().unwrap();
            assert_eq!(b.first_stamp().map(|s| s.ticks()), Some(i * 10));
        }
    }

    #[test]
    fn test_capacity_drops_new_batches() {
        let queue = BatchQueue::new(3);
        for i in 0..10u32 {
            queue.push(batch(&[i]));
        }
        let stats = queue.stats();
        assert_eq!(stats.pending_batches, 3);
        assert_eq!(stats.dropped_batches, 7);
        assert_eq!(stats.accepted_batches, 3);
        // the oldest batches survive
        assert_eq!(queue.take().and_then(|b| b.first_stamp()).map(|s| s.ticks()), Some(0));
    }

    #[test]
    fn test_read_ahead_accounting() {
        let queue = BatchQueue::new(0);
        queue.push(batch(&[0, 100]));
        queue.push(batch(&[200, 250, 300]));
        assert_eq!(queue.stats().pending_events, 5);
        assert_eq!(queue.stats().pending_span_ticks, 200);

        let _first = queue.take().unwrap();
        // the taken batch still counts until superseded
        assert_eq!(queue.stats().pending_batches, 2);
        assert_eq!(queue.stats().pending_events, 5);

        let _second = queue.take().unwrap();
        let stats = queue.stats();
        assert_eq!(stats.pending_batches, 1);
        assert_eq!(stats.pending_events, 3);
        assert_eq!(stats.pending_span_ticks, 100);

        queue.release_current();
        let stats = queue.stats();
        assert_eq!(stats.pending_batches, 0);
        assert_eq!(stats.pending_events, 0);
        assert_eq!(stats.pending_span_ticks, 0);
    }

    #[test]
    fn test_in_flight_batch_counts_against_capacity() {
        let queue = BatchQueue::new(1);
        queue.push(batch(&[1]));
        let _held = queue.take().unwrap();
        queue.push(batch(&[2]));
        assert_eq!(queue.stats().dropped_batches, 1);
        queue.release_current();
        queue.push(batch(&[3]));
        assert_eq!(queue.stats().accepted_batches, 2);
    }

    #[test]
    fn test_rate_from_span() {
        let queue = BatchQueue::new(0);
        // 11 events over 1000 ticks
        let stamps: Vec<u32> = (0..11).map(|i| i * 100).collect();
        queue.push(batch(&stamps));
        let rate = queue.stats().rate_hz;
        assert!((rate - 11.0 / 1000.0 * TICKS_PER_SECOND).abs() < 1e-6);
        // zero-span batch leaves the rate untouched
        queue.push(batch(&[5, 5]));
        assert_eq!(queue.stats().rate_hz, rate);
    }

    #[test]
    fn test_close_unblocks_take() {
        let queue = BatchQueue::new(0);
        let reader = queue.clone();
        let handle = thread::spawn(move || reader.take());
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert!(handle.join().unwrap().is_none());
        queue.push(batch(&[1]));
        assert_eq!(queue.stats().accepted_batches, 0);
        assert!(queue.take().is_none());
    }

    #[test]
    fn test_many_posts_wake_single_reader_in_order() {
        let queue = BatchQueue::new(0);
        let reader = queue.clone();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < 100 {
                match reader.take() {
                    Some(b) => seen.push(b.first_stamp().map(|s| s.ticks()).unwrap_or(0)),
                    None => break,
                }
            }
            seen
        });
        for i in 0..100u32 {
            queue.push(batch(&[i]));
        }
        let seen = handle.join().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<u32>>());
    }

    #[test]
    fn test_take_timeout_and_try_take() {
        let queue = BatchQueue::new(0);
        assert!(queue.try_take().is_none());
        assert!(queue.take_timeout(Duration::from_millis(20)).is_none());
        queue.push(batch(&[7]));
        assert!(queue.take_timeout(Duration::from_millis(20)).is_some());
    }

    #[test]
    fn test_stats_display() {
        let queue = BatchQueue::new(0);
        queue.push(batch(&[0, 12_500]));
        let text = queue.stats().to_string();
        assert!(text.starts_with("1 2 0.001000 "), "{}", text);
    }

    #[test]
    fn test_stats_serialize_for_reports() {
        let queue = BatchQueue::new(1);
        queue.push(batch(&[0, 100]));
        queue.push(batch(&[200]));
        let json = serde_json::to_value(queue.stats()).unwrap();
        assert_eq!(json["pending_batches"], 1);
        assert_eq!(json["pending_events"], 2);
        assert_eq!(json["dropped_batches"], 1);
        assert_eq!(json["accepted_batches"], 1);
    }

    #[test]
    fn test_unbounded_timeout_waits_like_take() {
        let queue = BatchQueue::new(0);
        queue.push(batch(&[3]));
        let taken = queue.take_timeout(Duration::MAX).unwrap();
        assert_eq!(taken.first_stamp().map(|s| s.ticks()), Some(3));

        let closer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });
        assert!(queue.take_timeout(Duration::MAX).is_none());
        handle.join().unwrap();
    }
}
