// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Consumer thread lifecycle shared by the surface and window consumers.
//!
//! A [`Worker`] owns one named OS thread. The consumer variants only supply
//! the loop body and an unblock hook; start, stop and join live here.

use crate::queue::BatchQueue;
use evsync_structures::{EventStreamError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Lifecycle of a consumer thread: `Idle -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConsumerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ConsumerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConsumerState::Idle,
            1 => ConsumerState::Running,
            2 => ConsumerState::Stopping,
            _ => ConsumerState::Stopped,
        }
    }
}

/// Shared view of a worker's state, handed to the loop body.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<AtomicU8>);

impl StateHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ConsumerState::Idle as u8)))
    }

    pub fn get(&self) -> ConsumerState {
        ConsumerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.get() == ConsumerState::Running
    }

    fn set(&self, state: ConsumerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ConsumerState, to: ConsumerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct Worker {
    tag: &'static str,
    thread_name: String,
    state: StateHandle,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(tag: &'static str, thread_name: impl Into<String>) -> Self {
        Self {
            tag,
            thread_name: thread_name.into(),
            state: StateHandle::new(),
            handle: None,
        }
    }

    pub(crate) fn state(&self) -> ConsumerState {
        self.state.get()
    }

    pub(crate) fn start<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(StateHandle) + Send + 'static,
    {
        if !self.state.transition(ConsumerState::Idle, ConsumerState::Running) {
            return Err(EventStreamError::AlreadyRunning(format!(
                "{} is {:?}",
                self.thread_name,
                self.state.get()
            )));
        }

        let state = self.state.clone();
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                body(state.clone());
                // loop ended on its own (queue closed by the producer side)
                state.transition(ConsumerState::Running, ConsumerState::Stopped);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                info!("[{}] {} started", self.tag, self.thread_name);
                Ok(())
            }
            Err(e) => {
                self.state.set(ConsumerState::Stopped);
                Err(EventStreamError::ThreadSpawn(format!(
                    "{}: {}",
                    self.thread_name, e
                )))
            }
        }
    }

    /// Close the queue, run `unblock`, and join the thread. Safe to call
    /// repeatedly and on a worker that never started.
    pub(crate) fn stop(&mut self, queue: &BatchQueue, unblock: impl FnOnce()) {
        match self.state.get() {
            ConsumerState::Idle => {
                self.state.set(ConsumerState::Stopped);
                queue.close();
                return;
            }
            ConsumerState::Stopped if self.handle.is_none() => return,
            _ => {}
        }

        info!("[{}] Stopping {}...", self.tag, self.thread_name);
        self.state.set(ConsumerState::Stopping);
        queue.close();
        unblock();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[{}] {} panicked during shutdown", self.tag, self.thread_name);
            }
        }
        self.state.set(ConsumerState::Stopped);
        info!("[{}] {} stopped", self.tag, self.thread_name);
    }
}
