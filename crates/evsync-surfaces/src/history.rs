// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Time-ordered event history for one channel.
//!
//! Backs region-of-interest queries: callers ask for the events that are at
//! least `offset` ticks old (the slice still considered in flight is skipped),
//! limited either by a duration or by a count, optionally restricted to a
//! square region.

use evsync_structures::{Event, EventStreamError, Result, Stamp, MAX_STAMP};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Square region centred on `(x, y)` with half-side `radius`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u16,
    pub y: u16,
    pub radius: u16,
}

impl Roi {
    pub fn new(x: u16, y: u16, radius: u16) -> Self {
        Self { x, y, radius }
    }

    pub fn contains(&self, event: &Event) -> bool {
        event.x.abs_diff(self.x) <= self.radius && event.y.abs_diff(self.y) <= self.radius
    }
}

/// How far back a query reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryLimit {
    /// Events no more than this many ticks older than the offset horizon.
    Duration(u32),
    /// At most this many events.
    Count(usize),
}

#[derive(Debug, Clone)]
pub struct EventHistory {
    events: VecDeque<Event>,
    retention: u32,
}

impl EventHistory {
    /// `retention` is the age in ticks beyond which events are pruned.
    pub fn new(retention: u32) -> Result<Self> {
        if retention == 0 || retention >= MAX_STAMP / 2 {
            return Err(EventStreamError::InvalidConfiguration(format!(
                "history retention must be in (0, {}) ticks, got {}",
                MAX_STAMP / 2,
                retention
            )));
        }
        Ok(Self {
            events: VecDeque::new(),
            retention,
        })
    }

    pub fn retention(&self) -> u32 {
        self.retention
    }

    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
        while let Some(front) = self.events.front() {
            if Stamp::elapsed(front.stamp, event.stamp) > self.retention {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn newest_stamp(&self) -> Option<Stamp> {
        self.events.back().map(|e| e.stamp)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events at least `offset` ticks older than the newest one, bounded by
    /// `limit` and filtered by `roi`, returned oldest first.
    pub fn query(&self, offset: u32, limit: QueryLimit, roi: Option<Roi>) -> Vec<Event> {
        let newest = match self.events.back() {
            Some(e) => e.stamp,
            None => return Vec::new(),
        };
        if limit == QueryLimit::Count(0) {
            return Vec::new();
        }

        let mut out = Vec::new();
        for event in self.events.iter().rev() {
            let age = Stamp::elapsed(event.stamp, newest) as u64;
            if age < offset as u64 {
                continue;
            }
            if let QueryLimit::Duration(length) = limit {
                if age >= offset as u64 + length as u64 {
                    break;
                }
            }
            if roi.map_or(true, |r| r.contains(event)) {
                out.push(*event);
                if let QueryLimit::Count(n) = limit {
                    if out.len() >= n {
                        break;
                    }
                }
            }
        }
        out.reverse();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with(stamps: &[u32]) -> EventHistory {
        let mut h = EventHistory::new(1_000).unwrap();
        for (i, &t) in stamps.iter().enumerate() {
            h.push(Event::at(i as u16, i as u16, 0, true, t));
        }
        h
    }

    #[test]
    fn test_retention_prunes_old_events() {
        let h = history_with(&[0, 500, 1_000, 1_600]);
        assert_eq!(h.len(), 2);
        assert_eq!(h.query(0, QueryLimit::Count(10), None)[0].stamp.ticks(), 1_000);
    }

    #[test]
    fn test_duration_query_with_offset() {
        let h = history_with(&[100, 200, 300, 400, 500]);
        // skip the newest 150 ticks, then take 200 ticks
        let got: Vec<u32> = h
            .query(150, QueryLimit::Duration(200), None)
            .iter()
            .map(|e| e.stamp.ticks())
            .collect();
        assert_eq!(got, vec![200, 300]);
    }

    #[test]
    fn test_count_query_is_chronological() {
        let h = history_with(&[10, 20, 30, 40]);
        let got: Vec<u32> = h
            .query(0, QueryLimit::Count(2), None)
            .iter()
            .map(|e| e.stamp.ticks())
            .collect();
        assert_eq!(got, vec![30, 40]);
        assert!(h.query(0, QueryLimit::Count(0), None).is_empty());
    }

    #[test]
    fn test_roi_filter() {
        let h = history_with(&[10, 20, 30, 40, 50]);
        let roi = Roi::new(3, 3, 1);
        let got = h.query(0, QueryLimit::Count(10), Some(roi));
        assert_eq!(got.len(), 3);
        assert!(got.iter().all(|e| roi.contains(e)));
    }

    #[test]
    fn test_query_across_wrap() {
        let h = history_with(&[MAX_STAMP - 20, MAX_STAMP - 5, 10]);
        let got = h.query(0, QueryLimit::Duration(20), None);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].stamp.ticks(), MAX_STAMP - 5);
    }

    #[test]
    fn test_empty_history_and_invalid_retention() {
        let h = EventHistory::new(10).unwrap();
        assert!(h.query(0, QueryLimit::Duration(10), None).is_empty());
        assert!(EventHistory::new(0).is_err());
        assert!(EventHistory::new(MAX_STAMP / 2).is_err());
    }
}
