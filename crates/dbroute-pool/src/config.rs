//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Default liveness probe.
pub const DEFAULT_VALIDATION_QUERY: &str = "SELECT 1";

/// Configuration for a single connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name used in log output (usually the role it serves).
    pub name: String,

    /// Number of connections kept alive even when idle.
    pub min_connections: u32,

    /// Upper bound on live connections (idle plus leased).
    pub max_connections: u32,

    /// Maximum time a caller waits for a connection.
    pub acquire_timeout: Duration,

    /// Maximum time spent establishing one physical connection.
    pub create_timeout: Duration,

    /// Idle connections above `min_connections` are closed after this long.
    pub idle_timeout: Duration,

    /// How often the background reaper runs. `None` disables it.
    pub reaper_interval: Option<Duration>,

    /// Statement used to probe connection liveness.
    pub validation_query: String,

    /// Whether idle connections are probed before being handed out.
    pub test_on_checkout: bool,

    /// Whether connections are reset before re-entering the idle set.
    pub reset_on_return: bool,

    /// How long `close()` waits for outstanding leases.
    pub drain_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            create_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            reaper_interval: Some(Duration::from_secs(30)),
            validation_query: DEFAULT_VALIDATION_QUERY.to_string(),
            test_on_checkout: true,
            reset_on_return: true,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the connection creation timeout.
    #[must_use]
    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the reaper interval, or disable the reaper with `None`.
    #[must_use]
    pub fn reaper_interval(mut self, interval: Option<Duration>) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Set the validation query.
    #[must_use]
    pub fn validation_query(mut self, query: impl Into<String>) -> Self {
        self.validation_query = query.into();
        self
    }

    /// Enable or disable probing idle connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Enable or disable resetting connections on return.
    #[must_use]
    pub fn reset_on_return(mut self, enabled: bool) -> Self {
        self.reset_on_return = enabled;
        self
    }

    /// Set the drain timeout used by `close()`.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Config(
                "max_connections must be greater than zero".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.create_timeout.is_zero() {
            return Err(PoolError::Config(
                "create_timeout must be greater than zero".into(),
            ));
        }
        if self.validation_query.trim().is_empty() {
            return Err(PoolError::Config("validation_query is empty".into()));
        }
        if matches!(self.reaper_interval, Some(interval) if interval.is_zero()) {
            return Err(PoolError::Config(
                "reaper_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation_query, "SELECT 1");
    }

    #[test]
    fn test_min_above_max_rejected() {
        let config = PoolConfig::new().min_connections(5).max_connections(2);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_zero_max_rejected() {
        let config = PoolConfig::new().min_connections(0).max_connections(0);
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn test_blank_validation_query_rejected() {
        let config = PoolConfig::new().validation_query("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_reaper_interval_rejected() {
        let config = PoolConfig::new().reaper_interval(Some(Duration::ZERO));
        assert!(config.validate().is_err());

        let disabled = PoolConfig::new().reaper_interval(None);
        assert!(disabled.validate().is_ok());
    }
}
