//! Per-role connection parameters and router configuration.
//!
//! Loading configuration from files or the environment is left to the
//! embedding application; these types only define the shape it hands in
//! (via serde or the builder methods) and validate it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dbroute_pool::{DEFAULT_VALIDATION_QUERY, PoolConfig};
use serde::Deserialize;
use serde::de::{self, Deserializer};

use crate::decision::{ReplicaSelector, RoundRobin, StaticAffinity};
use crate::error::{Error, Result};
use crate::role::Role;

/// Username and password for an endpoint.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Create credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection and sizing parameters for one role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionParameters {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 3306).
    pub port: u16,

    /// Database name.
    pub database: Option<String>,

    /// Authentication credentials.
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Bound on establishing one physical connection.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,

    /// Bound on waiting for a pooled connection. Falls back to
    /// `connect_timeout` when unset.
    #[serde(rename = "acquire_timeout_ms", with = "millis_opt")]
    pub acquire_timeout: Option<Duration>,

    /// Idle connections above the minimum are closed after this long.
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    pub idle_timeout: Duration,

    /// How long shutdown waits for outstanding leases.
    #[serde(rename = "drain_timeout_ms", with = "millis")]
    pub drain_timeout: Duration,

    /// Upper bound on live connections.
    pub max_pool_size: u32,

    /// Connections kept open while idle.
    pub min_pool_size: u32,

    /// Liveness probe statement.
    pub validation_query: String,

    /// Driver-specific options passed through untouched, such as `ssl`,
    /// `tcpKeepAlive` or `tcpNoDelay`.
    pub options: BTreeMap<String, String>,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: None,
            credentials: Credentials::default(),
            connect_timeout: Duration::from_secs(10),
            acquire_timeout: None,
            idle_timeout: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(30),
            max_pool_size: 10,
            min_pool_size: 1,
            validation_query: DEFAULT_VALIDATION_QUERY.to_string(),
            options: BTreeMap::new(),
        }
    }
}

impl ConnectionParameters {
    /// Create parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string.
    ///
    /// Supports ADO.NET-style key/value pairs:
    /// ```text
    /// Server=db1,3307;Database=sso;User Id=app;Password=secret;Max Pool Size=20;
    /// ```
    ///
    /// Keys not recognised here are kept in [`options`](Self::options) for
    /// the driver.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut params = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;

            let raw_key = key.trim();
            let key = raw_key.to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "server" | "data source" | "host" => {
                    if let Some((host, port)) = value.split_once(',') {
                        params.host = host.trim().to_string();
                        params.port = parse_value(port.trim(), "port")?;
                    } else {
                        params.host = value.to_string();
                    }
                }
                "port" => params.port = parse_value(value, "port")?,
                "database" | "initial catalog" => params.database = Some(value.to_string()),
                "user id" | "uid" | "user" | "username" => {
                    params.credentials.username = value.to_string();
                }
                "password" | "pwd" => params.credentials.password = value.to_string(),
                "connect timeout" | "connection timeout" => {
                    params.connect_timeout = Duration::from_secs(parse_value(value, "timeout")?);
                }
                "acquire timeout" => {
                    params.acquire_timeout =
                        Some(Duration::from_secs(parse_value(value, "timeout")?));
                }
                "idle timeout" => {
                    params.idle_timeout = Duration::from_secs(parse_value(value, "timeout")?);
                }
                "max pool size" => params.max_pool_size = parse_value(value, "pool size")?,
                "min pool size" => params.min_pool_size = parse_value(value, "pool size")?,
                "validation query" => params.validation_query = value.to_string(),
                _ => {
                    tracing::trace!(key = %raw_key, "passing connection string option to driver");
                    params.options.insert(raw_key.to_string(), value.to_string());
                }
            }
        }

        Ok(params)
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the drain timeout.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the pool size bounds.
    #[must_use]
    pub fn pool_size(mut self, min: u32, max: u32) -> Self {
        self.min_pool_size = min;
        self.max_pool_size = max;
        self
    }

    /// Set the validation query.
    #[must_use]
    pub fn validation_query(mut self, query: impl Into<String>) -> Self {
        self.validation_query = query.into();
        self
    }

    /// Set a driver option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The effective acquisition bound.
    #[must_use]
    pub fn effective_acquire_timeout(&self) -> Duration {
        self.acquire_timeout.unwrap_or(self.connect_timeout)
    }

    /// Check the parameters for obvious mistakes.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be zero".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("connect timeout must be greater than zero".into()));
        }
        self.pool_config(Role::Primary)
            .validate()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Pool configuration for the pool serving `role`.
    #[must_use]
    pub fn pool_config(&self, role: Role) -> PoolConfig {
        PoolConfig::new()
            .name(role.to_string())
            .min_connections(self.min_pool_size)
            .max_connections(self.max_pool_size)
            .acquire_timeout(self.effective_acquire_timeout())
            .create_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .drain_timeout(self.drain_timeout)
            .validation_query(self.validation_query.clone())
    }
}

fn parse_value<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {what}: {value}")))
}

/// How reads are spread across replicas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaSelection {
    /// Rotate through replicas on each decision.
    #[default]
    RoundRobin,
    /// Keep a transaction on one replica chosen from its id.
    Static,
}

impl ReplicaSelection {
    /// Build the selector for this policy.
    #[must_use]
    pub fn selector(&self) -> Arc<dyn ReplicaSelector> {
        match self {
            ReplicaSelection::RoundRobin => Arc::new(RoundRobin::new()),
            ReplicaSelection::Static => Arc::new(StaticAffinity),
        }
    }
}

/// Complete router configuration as handed in by the application.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Role used when the read-only hint is unknown.
    #[serde(default = "default_role")]
    pub default_role: Role,

    /// Must be set to allow a replica as the default role.
    #[serde(default)]
    pub allow_replica_default: bool,

    /// Replica selection policy.
    #[serde(default)]
    pub replica_selection: ReplicaSelection,

    /// Connection parameters per role.
    ///
    /// `replica` and `replica-0` are the same role and may not both appear.
    #[serde(deserialize_with = "unique_roles")]
    pub roles: BTreeMap<Role, ConnectionParameters>,
}

fn default_role() -> Role {
    Role::Primary
}

fn unique_roles<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<Role, ConnectionParameters>, D::Error> {
    let named = BTreeMap::<String, ConnectionParameters>::deserialize(deserializer)?;
    let mut roles = BTreeMap::new();
    for (name, params) in named {
        let role: Role = name.parse().map_err(de::Error::custom)?;
        if roles.insert(role, params).is_some() {
            return Err(de::Error::custom(format!(
                "role {role} is configured more than once"
            )));
        }
    }
    Ok(roles)
}

impl RouterConfig {
    /// Configuration with a primary and no replicas.
    #[must_use]
    pub fn new(primary: ConnectionParameters) -> Self {
        Self {
            default_role: Role::Primary,
            allow_replica_default: false,
            replica_selection: ReplicaSelection::default(),
            roles: BTreeMap::from([(Role::Primary, primary)]),
        }
    }

    /// Add a replica endpoint.
    #[must_use]
    pub fn replica(mut self, role: Role, params: ConnectionParameters) -> Self {
        self.roles.insert(role, params);
        self
    }

    /// Set the replica selection policy.
    #[must_use]
    pub fn replica_selection(mut self, selection: ReplicaSelection) -> Self {
        self.replica_selection = selection;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
