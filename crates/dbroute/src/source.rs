//! Routing connection source.
//!
//! [`RoutingConnectionSource`] is what the data-access layer talks to. It
//! asks the [`DecisionEngine`] for a role, looks the role's pool up in the
//! [`PoolRegistry`] and leases a connection from it. Callers never name a
//! role or a pool.
//!
//! Transactions are modelled by ownership: [`begin_transaction`] hands out a
//! transactional [`RoutingContext`], every acquisition with it lands on the
//! role chosen by the first one, and [`commit`]/[`rollback`] consume it.
//!
//! [`begin_transaction`]: RoutingConnectionSource::begin_transaction
//! [`commit`]: RoutingConnectionSource::commit
//! [`rollback`]: RoutingConnectionSource::rollback

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use dbroute_pool::{Connection, PooledConnection};
use tracing::Instrument;

use crate::config::RouterConfig;
use crate::context::RoutingContext;
use crate::decision::DecisionEngine;
use crate::error::{Error, Result};
use crate::instrumentation::{self, span_names};
use crate::registry::{Driver, PoolRegistry};
use crate::role::Role;

/// Routes connection requests to the pool serving the decided role.
///
/// Cheap to clone; clones share the registry and engine.
#[derive(Debug, Clone)]
pub struct RoutingConnectionSource {
    engine: DecisionEngine,
    registry: Arc<PoolRegistry>,
}

impl RoutingConnectionSource {
    /// Source over `registry` with a primary-default engine covering the
    /// registry's replicas.
    #[must_use]
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        let engine = DecisionEngine::new(registry.replicas());
        Self { engine, registry }
    }

    /// Source with a custom decision engine.
    ///
    /// Every role the engine can produce must have a pool.
    pub fn with_engine(registry: Arc<PoolRegistry>, engine: DecisionEngine) -> Result<Self> {
        let default_role = engine.default_role();
        if !registry.contains(default_role) {
            return Err(Error::UnknownRole(default_role));
        }
        if let Some(missing) = engine
            .replicas()
            .iter()
            .map(|id| Role::Replica(*id))
            .find(|role| !registry.contains(*role))
        {
            return Err(Error::UnknownRole(missing));
        }
        Ok(Self { engine, registry })
    }

    /// Initialize pools for every configured role and build a source over
    /// them.
    pub async fn from_config(config: &RouterConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        let registry = Arc::new(PoolRegistry::from_config(config, driver).await?);
        let source = DecisionEngine::new(registry.replicas())
            .with_selector(config.replica_selection.selector())
            .with_default_role(config.default_role, config.allow_replica_default)
            .and_then(|engine| Self::with_engine(Arc::clone(&registry), engine));
        if source.is_err() {
            registry.shutdown().await;
        }
        source
    }

    /// Acquire a connection for `ctx`, waiting up to the target pool's
    /// acquire timeout.
    ///
    /// Pool errors are returned unchanged; the operation is never retried
    /// against another role.
    pub async fn acquire(&self, ctx: &RoutingContext) -> Result<RoutedConnection> {
        self.route(ctx, None).await
    }

    /// Acquire a connection for `ctx`, waiting at most `timeout`.
    ///
    /// A zero timeout fails immediately with `Exhausted` when no connection
    /// is free.
    pub async fn acquire_with_timeout(
        &self,
        ctx: &RoutingContext,
        timeout: Duration,
    ) -> Result<RoutedConnection> {
        self.route(ctx, Some(timeout)).await
    }

    async fn route(
        &self,
        ctx: &RoutingContext,
        timeout: Option<Duration>,
    ) -> Result<RoutedConnection> {
        let mut role = self.engine.decide(ctx);
        if ctx.is_transactional() {
            role = ctx.pin(role);
        }

        let span = instrumentation::acquire_span(ctx, role);
        async move {
            let pool = self.registry.get(role)?;
            let conn = match timeout {
                Some(timeout) => pool.acquire(timeout).await,
                None => pool.get().await,
            };
            match conn {
                Ok(conn) => {
                    tracing::debug!("connection acquired");
                    Ok(RoutedConnection { role, conn })
                }
                Err(e) => {
                    tracing::warn!(error = %e, "connection acquisition failed");
                    Err(e.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Start a transaction whose read-only flag is already known.
    ///
    /// No connection is acquired here; the first acquisition with the
    /// returned context chooses and pins the role.
    #[must_use]
    pub fn begin_transaction(&self, read_only: bool) -> RoutingContext {
        let ctx = RoutingContext::for_transaction(read_only);
        let _span =
            instrumentation::transaction_span(span_names::BEGIN_TRANSACTION, &ctx).entered();
        tracing::debug!("transaction started");
        ctx
    }

    /// End a transaction successfully.
    ///
    /// Connections leased under `ctx` go back to their pool when dropped;
    /// this only closes the routing scope.
    pub fn commit(&self, ctx: RoutingContext) -> Result<()> {
        self.end_transaction(span_names::COMMIT, ctx)
    }

    /// Abandon a transaction.
    pub fn rollback(&self, ctx: RoutingContext) -> Result<()> {
        self.end_transaction(span_names::ROLLBACK, ctx)
    }

    fn end_transaction(&self, name: &'static str, ctx: RoutingContext) -> Result<()> {
        if !ctx.is_transactional() {
            return Err(Error::NotInTransaction);
        }
        let _span = instrumentation::transaction_span(name, &ctx).entered();
        tracing::debug!(outcome = name, "transaction ended");
        Ok(())
    }

    /// The decision engine.
    #[must_use]
    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// The pool registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Close every pool.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// A pooled connection tagged with the role that served it.
///
/// Returned to its pool on drop.
#[derive(Debug)]
pub struct RoutedConnection {
    role: Role,
    conn: PooledConnection,
}

impl RoutedConnection {
    /// Role of the pool the connection came from.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Mark the connection as unusable so it is discarded on return.
    pub fn invalidate(&mut self) {
        self.conn.invalidate();
    }

    /// Unwrap the pooled connection.
    #[must_use]
    pub fn into_inner(self) -> PooledConnection {
        self.conn
    }

    /// Return the connection to its pool, waiting for any reset to finish.
    pub async fn release(self) {
        self.conn.release().await;
    }
}

impl Deref for RoutedConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        &*self.conn
    }
}

impl DerefMut for RoutedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.conn
    }
}
