// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Common error type for evsync operations.
///
/// Overload (dropped batches) and degraded timing (CPU delay saturation) are
/// deliberately absent: they are reported through stats, not errors.
///
/// # Examples
/// ```
/// use evsync_structures::EventStreamError;
///
/// fn check_channel(channel: usize, channel_count: usize) -> Result<(), EventStreamError> {
///     if channel >= channel_count {
///         return Err(EventStreamError::InvalidArgument(format!("channel {}", channel)));
///     }
///     Ok(())
/// }
///
/// assert!(check_channel(2, 2).is_err());
/// assert!(check_channel(1, 2).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventStreamError {
    /// Unknown channel or stream label passed to a query
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Rejected configuration, raised before any worker thread starts
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Lifecycle call made in the wrong state
    #[error("Already running: {0}")]
    AlreadyRunning(String),
    /// The OS refused to spawn a worker thread
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
}

/// Result type for evsync operations
pub type Result<T> = std::result::Result<T, EventStreamError>;
