//! One connection pool per configured role.
//!
//! The registry is built once at startup. Every pool is pre-warmed to its
//! minimum size; if any of them cannot be, the ones already opened are
//! closed again and startup fails as a whole. After initialization the set
//! of roles never changes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dbroute_pool::{BoxError, Connector, DynConnection, Pool, PoolStatus};
use futures_util::future::join_all;
use hashbrown::HashMap;
use tracing::Instrument;

use crate::config::{ConnectionParameters, RouterConfig};
use crate::error::{Error, Result};
use crate::instrumentation::span_names;
use crate::role::{ReplicaId, Role};

/// Opens physical connections from connection parameters.
///
/// This is the seam to a concrete database driver.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Open one connection to the endpoint described by `params`.
    async fn connect(
        &self,
        params: &ConnectionParameters,
    ) -> std::result::Result<DynConnection, BoxError>;
}

/// Binds a driver to the parameters of one role.
struct DriverConnector {
    driver: Arc<dyn Driver>,
    params: ConnectionParameters,
}

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self) -> std::result::Result<DynConnection, BoxError> {
        self.driver.connect(&self.params).await
    }
}

/// Pools keyed by role.
pub struct PoolRegistry {
    pools: HashMap<Role, Pool>,
    parameters: HashMap<Role, ConnectionParameters>,
}

impl PoolRegistry {
    /// Create and pre-warm a pool for every role.
    ///
    /// A primary role is required. Roles must be unique.
    pub async fn initialize(
        roles: impl IntoIterator<Item = (Role, ConnectionParameters)>,
        driver: Arc<dyn Driver>,
    ) -> Result<Self> {
        let mut parameters: HashMap<Role, ConnectionParameters> = HashMap::new();
        for (role, params) in roles {
            params
                .validate()
                .map_err(|e| Error::Config(format!("role {role}: {e}")))?;
            if parameters.insert(role, params).is_some() {
                return Err(Error::Config(format!("role {role} configured more than once")));
            }
        }
        if !parameters.contains_key(&Role::Primary) {
            return Err(Error::Config("a primary role is required".into()));
        }

        let span = tracing::info_span!(span_names::INITIALIZE, roles = parameters.len());
        async move {
            let mut pools = HashMap::with_capacity(parameters.len());
            for (role, params) in &parameters {
                let connector = Arc::new(DriverConnector {
                    driver: Arc::clone(&driver),
                    params: params.clone(),
                });
                match Pool::new(params.pool_config(*role), connector).await {
                    Ok(pool) => {
                        pools.insert(*role, pool);
                    }
                    Err(source) => {
                        close_all(pools.values()).await;
                        return Err(Error::StartupFailed { role: *role, source });
                    }
                }
            }

            let results = join_all(pools.iter().map(|(role, pool)| async move {
                pool.warm_up().await.map_err(|source| (*role, source))
            }))
            .await;

            if let Some((role, source)) = results.into_iter().find_map(|r| r.err()) {
                tracing::error!(role = %role, error = %source, "pool failed to start");
                close_all(pools.values()).await;
                return Err(Error::StartupFailed { role, source });
            }

            tracing::info!(roles = pools.len(), "connection pools ready");
            Ok(Self { pools, parameters })
        }
        .instrument(span)
        .await
    }

    /// Initialize from a router configuration.
    pub async fn from_config(config: &RouterConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        Self::initialize(
            config.roles.iter().map(|(role, params)| (*role, params.clone())),
            driver,
        )
        .await
    }

    /// The pool serving `role`.
    pub fn get(&self, role: Role) -> Result<&Pool> {
        self.pools.get(&role).ok_or(Error::UnknownRole(role))
    }

    /// Whether a pool exists for `role`.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.pools.contains_key(&role)
    }

    /// All configured roles, primary first.
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.pools.keys().copied().collect();
        roles.sort_unstable();
        roles
    }

    /// Configured replica ids, in ascending order.
    #[must_use]
    pub fn replicas(&self) -> Vec<ReplicaId> {
        let mut replicas: Vec<ReplicaId> =
            self.pools.keys().filter_map(Role::replica_id).collect();
        replicas.sort_unstable();
        replicas
    }

    /// Connection parameters of `role`.
    #[must_use]
    pub fn parameters(&self, role: Role) -> Option<&ConnectionParameters> {
        self.parameters.get(&role)
    }

    /// Status snapshot of every pool, primary first.
    #[must_use]
    pub fn status(&self) -> Vec<(Role, PoolStatus)> {
        self.roles()
            .into_iter()
            .filter_map(|role| self.pools.get(&role).map(|pool| (role, pool.status())))
            .collect()
    }

    /// Close every pool.
    ///
    /// Outstanding leases are waited for up to each pool's drain timeout.
    pub async fn shutdown(&self) {
        let span = tracing::info_span!(span_names::SHUTDOWN, roles = self.pools.len());
        async {
            close_all(self.pools.values()).await;
            tracing::info!("connection pools closed");
        }
        .instrument(span)
        .await;
    }
}

async fn close_all<'a>(pools: impl Iterator<Item = &'a Pool>) {
    join_all(pools.map(Pool::close)).await;
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("roles", &self.roles())
            .finish_non_exhaustive()
    }
}
