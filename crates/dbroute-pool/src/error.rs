//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error type returned by drivers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The bounded operation that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Waiting for an idle or newly created connection.
    Acquire,
    /// Establishing a physical connection.
    Create,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquire => f.write_str("acquire"),
            Self::Create => f.write_str("create"),
        }
    }
}

/// Errors that can occur while managing pooled connections.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Acquisition or connection creation exceeded its bound.
    #[error("{phase} timed out after {timeout:?}")]
    Timeout {
        /// Which bound was exceeded.
        phase: TimeoutPhase,
        /// The configured bound.
        timeout: Duration,
    },

    /// The pool is at capacity and the caller asked not to wait.
    #[error("pool exhausted: all {max} connections in use")]
    Exhausted {
        /// Maximum pool size.
        max: u32,
    },

    /// A connection failed its liveness probe and was discarded.
    #[error("connection validation failed: {reason}")]
    ValidationFailed {
        /// Probe failure description.
        reason: String,
    },

    /// The pool has been closed.
    #[error("pool is closed")]
    PoolClosed,

    /// The driver could not establish a connection.
    #[error("connection failed: {0}")]
    Connect(#[source] BoxError),

    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    Config(String),
}

impl PoolError {
    /// Whether retrying the operation may succeed.
    ///
    /// Only the caller knows whether its operation is idempotent, so the pool
    /// never retries on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Exhausted { .. } | Self::ValidationFailed { .. }
        )
    }
}
