// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evsync - event-camera batch ingestion
//!
//! Moves decoded event batches from producer threads into queryable
//! per-channel representations, one dedicated consumer thread per stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use evsync::prelude::*;
//!
//! let queue = BatchQueue::named("left", 64);
//! let mut consumer = SurfaceConsumer::new(SurfaceConsumerConfig::default(), queue.clone())?;
//! consumer.start()?;
//!
//! queue.push(EventBatch::new(vec![Event::at(10, 20, 0, true, 1000)], None));
//!
//! let recent = consumer.query_roi(0, QueryLimit::Count(100), Some(Roi::new(10, 20, 5)))?;
//! println!("{} events near (10, 20)", recent.len());
//! # Ok::<(), evsync::EventStreamError>(())
//! ```
//!
//! ## Feature Flags
//! - **`config`** (default): `evsync.toml` loading and the [`settings`] mapping
//! - **`file-logging`**: per-run JSON log files
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: evsync-structures                          │
//! │  (Stamp, Event, EventBatch, EventStreamError)           │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Representations: evsync-surfaces                       │
//! │  (DecayingSurface, FixedWindow, EventHistory)           │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Ingestion: evsync-ingest                               │
//! │  (BatchQueue, consumer threads, StreamSynchronizer)     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export foundation
pub use evsync_structures as structures;
pub use evsync_structures::{EventStreamError, Result};

// Re-export representations and ingestion
pub use evsync_ingest as ingest;
pub use evsync_surfaces as surfaces;

pub use evsync_observability as observability;

#[cfg(feature = "config")]
pub use evsync_config as config;

#[cfg(feature = "config")]
pub mod settings;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::structures::{
        seconds_to_ticks, ticks_to_seconds, ArrivalStamp, Event, EventBatch, EventStreamError,
        Stamp, MAX_STAMP,
    };

    pub use crate::surfaces::{
        DecayPolicy, DecayPolicyKind, DecayingSurface, EventHistory, FixedWindow, QueryLimit,
        Roi, WindowBound,
    };

    pub use crate::ingest::{
        BatchQueue, ConsumerState, DelayStatus, QueueStats, ReferenceStamps, StreamSynchronizer,
        SurfaceConsumer, SurfaceConsumerConfig, SynchronizerConfig, WindowConsumer,
        WindowConsumerConfig,
    };

    #[cfg(feature = "config")]
    pub use crate::settings::EngineSettings;
}
