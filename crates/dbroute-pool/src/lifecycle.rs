//! Connection lifecycle management.
//!
//! The pool is driver-agnostic: a [`Connector`] opens physical connections to
//! one endpoint and each [`Connection`] knows how to answer a liveness probe.
//! Dropping a connection closes it.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::BoxError;

/// A physical database connection managed by the pool.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Run the liveness probe `query`.
    async fn ping(&mut self, query: &str) -> Result<(), BoxError>;

    /// Clear session state before the connection is reused.
    async fn reset(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Whether the driver has observed the connection break.
    fn is_broken(&self) -> bool {
        false
    }
}

/// Boxed connection as stored by the pool.
pub type DynConnection = Box<dyn Connection>;

/// Opens physical connections to a fixed endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a new connection.
    async fn connect(&self) -> Result<DynConnection, BoxError>;
}

/// Lease state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Sitting in the idle set.
    Idle,
    /// Leased to a caller.
    InUse,
    /// Marked broken; discarded on release.
    Invalid,
}

/// Bookkeeping the pool keeps for every connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool-unique connection id.
    pub id: u64,
    /// When the physical connection was established.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been leased.
    pub checkout_count: u64,
    /// Current lease state.
    pub state: ConnectionState,
}

impl ConnectionMetadata {
    pub(crate) fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
            state: ConnectionState::Idle,
        }
    }

    /// Age of the physical connection.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection was last used.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    pub(crate) fn mark_checked_out(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
        self.state = ConnectionState::InUse;
    }

    pub(crate) fn mark_idle(&mut self) {
        self.last_used_at = Instant::now();
        self.state = ConnectionState::Idle;
    }
}

/// Outcome of a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    /// The probe succeeded.
    Healthy {
        /// Probe round-trip time.
        latency: Duration,
    },
    /// The probe failed.
    Unhealthy {
        /// Failure description.
        reason: String,
        /// Time spent before the failure.
        latency: Duration,
    },
}

impl HealthCheckResult {
    /// Whether the probe succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }

    pub(crate) async fn probe(conn: &mut dyn Connection, query: &str) -> Self {
        let started = Instant::now();
        if conn.is_broken() {
            return Self::Unhealthy {
                reason: "connection reported broken by driver".to_string(),
                latency: started.elapsed(),
            };
        }
        match conn.ping(query).await {
            Ok(()) => Self::Healthy {
                latency: started.elapsed(),
            },
            Err(e) => Self::Unhealthy {
                reason: e.to_string(),
                latency: started.elapsed(),
            },
        }
    }
}
