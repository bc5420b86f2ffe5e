//! # dbroute-pool
//!
//! Async connection pool for a single database endpoint.
//!
//! The pool is driver-agnostic: it opens connections through a
//! [`Connector`] and probes them through [`Connection::ping`]. It never
//! blocks a thread; callers waiting for capacity are suspended tasks.
//!
//! ## Features
//!
//! - Lazy creation up to `max_connections`, pre-warming to `min_connections`
//! - Liveness probe (`SELECT 1` by default) on checkout and on demand
//! - Broken or invalidated connections are discarded, never reused
//! - Separate acquisition and creation timeouts
//! - Background reaper for idle eviction and minimum-size replenishment
//! - Drain-then-close shutdown
//! - Status snapshots and metrics for observability
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbroute_pool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! let pool = Pool::builder()
//!     .connector(connector)
//!     .min_connections(5)
//!     .max_connections(20)
//!     .idle_timeout(Duration::from_secs(300))
//!     .build()
//!     .await?;
//! pool.warm_up().await?;
//!
//! // Get a connection from the pool
//! let conn = pool.get().await?;
//! // Use connection...
//! // Connection automatically returned to pool on drop
//!
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod reaper;

// Configuration
pub use config::{DEFAULT_VALIDATION_QUERY, PoolConfig};

// Error types
pub use error::{BoxError, PoolError, TimeoutPhase};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};
pub use reaper::MaintenanceReport;

// Lifecycle management
pub use lifecycle::{
    Connection, ConnectionMetadata, ConnectionState, Connector, DynConnection, HealthCheckResult,
};
