// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # evsync-observability
//!
//! Logging setup shared by the evsync crates and tools.
//!
//! Every crate logs through `tracing` with a bracketed component prefix
//! (`[BATCH-QUEUE]`, `[SURFACE-CONSUMER]`, ...). This crate only decides where
//! those records go and at which level, with per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: per-run JSON log files with retention cleanup

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

// Re-export commonly used items
pub use cli::*;
pub use config::*;
pub use init::*;

/// Known evsync crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "evsync",
    "evsync-structures",
    "evsync-surfaces",
    "evsync-ingest",
    "evsync-config",
    "evsync-observability",
];
