// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evsync-ingest
//!
//! Moves decoded event batches from producers to queryable per-channel state.
//!
//! ```text
//! producer -> BatchQueue -> SurfaceConsumer | WindowConsumer -> queries
//!                           StreamSynchronizer (one WindowConsumer per label)
//! ```
//!
//! Locking: each queue has its own mutex, each consumer has one mutex
//! guarding its structures and bookkeeping. A consumer may take its queue's
//! lock while holding its own, never the other way round.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod queue;
pub mod surface_consumer;
pub mod synchronizer;
pub mod window_consumer;
pub mod worker;

pub use queue::{BatchQueue, QueueStats};
pub use surface_consumer::{DelayStatus, SurfaceConsumer, SurfaceConsumerConfig};
pub use synchronizer::{ReferenceStamps, StreamSynchronizer, SynchronizerConfig};
pub use window_consumer::{WindowConsumer, WindowConsumerConfig};
pub use worker::{ConsumerState, StateHandle};
