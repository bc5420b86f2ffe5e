//! # dbroute
//!
//! Read/write routing of database connections across a primary and its
//! read replicas.
//!
//! Each operation carries a [`RoutingContext`] with a tri-state read-only
//! hint. The [`DecisionEngine`] turns it into a [`Role`], and the
//! [`RoutingConnectionSource`] leases a connection from the pool serving
//! that role. Callers only ever say what they know about their intent.
//!
//! ## Features
//!
//! - **Safe default**: an unknown hint goes to the primary
//! - **Transaction affinity**: every acquisition in a transaction lands on
//!   the role chosen by its first one
//! - **Pluggable replica selection**: round-robin or per-transaction
//!   affinity, or any [`ReplicaSelector`]
//! - **Fail-fast startup**: every pool is pre-warmed or startup fails
//! - **Driver-agnostic**: connections come from a [`Driver`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbroute::{ConnectionParameters, RouterConfig, Role, RoutingConnectionSource, RoutingContext};
//!
//! let config = RouterConfig::new(ConnectionParameters::from_connection_string(
//!     "Server=db-primary;Database=app;User Id=app;Password=secret;",
//! )?)
//! .replica(Role::REPLICA, ConnectionParameters::new().host("db-replica"));
//!
//! let source = RoutingConnectionSource::from_config(&config, driver).await?;
//!
//! // Reads may go to the replica
//! let conn = source.acquire(&RoutingContext::read_only()).await?;
//!
//! // Transactions stay on one role
//! let tx = source.begin_transaction(false);
//! let conn = source.acquire(&tx).await?;
//! source.commit(tx)?;
//!
//! source.shutdown().await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod instrumentation;
pub mod registry;
pub mod role;
pub mod source;

pub use config::{ConnectionParameters, Credentials, ReplicaSelection, RouterConfig};
pub use context::{ReadOnlyHint, RoutingContext, TransactionId};
pub use decision::{DecisionEngine, ReplicaSelector, RoundRobin, StaticAffinity};
pub use error::{Error, Result};
pub use registry::{Driver, PoolRegistry};
pub use role::{ParseRoleError, ReplicaId, Role};
pub use source::{RoutedConnection, RoutingConnectionSource};

// Pool types surfaced through this API
pub use dbroute_pool::{
    BoxError, Connection, DynConnection, PoolError, PoolStatus, PooledConnection, TimeoutPhase,
};
