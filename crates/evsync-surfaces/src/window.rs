// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use evsync_structures::{Event, EventStreamError, Result, Stamp, MAX_STAMP};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How a [`FixedWindow`] decides which events to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "value")]
pub enum WindowBound {
    /// Keep the most recent `n` events.
    Count(usize),
    /// Keep events at most this many ticks older than the newest one.
    Duration(u32),
}

impl WindowBound {
    pub fn validate(&self) -> Result<()> {
        match *self {
            WindowBound::Count(0) => Err(EventStreamError::InvalidConfiguration(
                "window size must be positive".to_string(),
            )),
            WindowBound::Duration(0) => Err(EventStreamError::InvalidConfiguration(
                "window duration must be positive".to_string(),
            )),
            WindowBound::Duration(ticks) if ticks >= MAX_STAMP / 2 => {
                Err(EventStreamError::InvalidConfiguration(format!(
                    "window duration {} ticks must be below {} (half the stamp range)",
                    ticks,
                    MAX_STAMP / 2
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Sliding window over one channel's events.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    bound: WindowBound,
    events: VecDeque<Event>,
}

impl FixedWindow {
    pub fn new(bound: WindowBound) -> Result<Self> {
        bound.validate()?;
        let events = match bound {
            WindowBound::Count(n) => VecDeque::with_capacity(n),
            WindowBound::Duration(_) => VecDeque::new(),
        };
        Ok(Self { bound, events })
    }

    pub fn bound(&self) -> WindowBound {
        self.bound
    }

    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
        match self.bound {
            WindowBound::Count(n) => {
                while self.events.len() > n {
                    self.events.pop_front();
                }
            }
            WindowBound::Duration(ticks) => {
                let newest = event.stamp;
                while let Some(front) = self.events.front() {
                    if Stamp::elapsed(front.stamp, newest) > ticks {
                        self.events.pop_front();
                    } else {
                        break;
                    }
                }
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = Event>>(&mut self, events: I) {
        for event in events {
            self.push(event);
        }
    }

    /// Copy of the window contents, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().copied().collect()
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(t: u32) -> Event {
        Event::at((t % 7) as u16, 1, 0, true, t)
    }

    #[test]
    fn test_count_window_keeps_latest() {
        let mut window = FixedWindow::new(WindowBound::Count(3)).unwrap();
        window.extend([ev(1), ev(2), ev(3), ev(4)]);
        assert_eq!(window.snapshot(), vec![ev(2), ev(3), ev(4)]);
    }

    #[test]
    fn test_duration_window_evicts_by_age() {
        let mut window = FixedWindow::new(WindowBound::Duration(100)).unwrap();
        window.extend([ev(0), ev(50), ev(100)]);
        assert_eq!(window.len(), 3);
        window.push(ev(151));
        assert_eq!(window.snapshot(), vec![ev(100), ev(151)]);
    }

    #[test]
    fn test_duration_window_across_wrap() {
        let mut window = FixedWindow::new(WindowBound::Duration(100)).unwrap();
        window.push(ev(MAX_STAMP - 60));
        window.push(ev(MAX_STAMP - 10));
        window.push(ev(30));
        assert_eq!(window.len(), 3);
        window.push(ev(60));
        assert_eq!(window.snapshot().first().map(|e| e.stamp.ticks()), Some(MAX_STAMP - 10));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(FixedWindow::new(WindowBound::Count(0)).is_err());
        assert!(FixedWindow::new(WindowBound::Duration(0)).is_err());
        assert!(FixedWindow::new(WindowBound::Duration(MAX_STAMP / 2)).is_err());
        assert!(FixedWindow::new(WindowBound::Duration(MAX_STAMP / 2 - 1)).is_ok());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut window = FixedWindow::new(WindowBound::Count(2)).unwrap();
        window.push(ev(1));
        let snap = window.snapshot();
        window.push(ev(2));
        window.clear();
        assert_eq!(snap, vec![ev(1)]);
        assert!(window.is_empty());
    }
}
