//! Routing error types.

use dbroute_pool::PoolError;
use thiserror::Error;

use crate::role::Role;

/// Result type for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the routing layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A pool operation failed; passed through unchanged.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// No pool is configured for the requested role.
    #[error("no pool configured for role {0}")]
    UnknownRole(Role),

    /// A pool could not be pre-warmed to its minimum size.
    #[error("failed to start pool for role {role}: {source}")]
    StartupFailed {
        /// Role whose pool failed.
        role: Role,
        /// Underlying pool failure.
        #[source]
        source: PoolError,
    },

    /// Invalid routing or connection configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Commit or rollback was called with a non-transactional context.
    #[error("routing context does not belong to a transaction")]
    NotInTransaction,
}

impl Error {
    /// Whether the caller may sensibly retry.
    ///
    /// Only pool timeouts, exhaustion and validation failures qualify.
    /// `UnknownRole` and `StartupFailed` point at configuration or code
    /// defects.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Pool(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pool_errors_pass_through() {
        let err = Error::from(PoolError::Exhausted { max: 4 });
        assert_eq!(err.to_string(), "pool exhausted: all 4 connections in use");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_startup_and_role_errors_are_fatal() {
        let startup = Error::StartupFailed {
            role: Role::REPLICA,
            source: PoolError::Timeout {
                phase: dbroute_pool::TimeoutPhase::Create,
                timeout: Duration::from_secs(1),
            },
        };
        assert!(!startup.is_recoverable());
        assert!(startup.to_string().contains("replica"));
        assert!(!Error::UnknownRole(Role::replica(7)).is_recoverable());
    }
}
