//! Connection pool implementation.
//!
//! Live and idle accounting for one pool sits behind a single
//! [`parking_lot::Mutex`]. Waiters park on a [`tokio::sync::Notify`] that is
//! signalled whenever a connection returns to the idle set or a slot frees up,
//! so acquisition suspends the calling task and never an OS thread.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::{PoolError, TimeoutPhase};
use crate::lifecycle::{
    Connection, ConnectionMetadata, ConnectionState, Connector, DynConnection, HealthCheckResult,
};

/// A pool of connections to a single endpoint.
///
/// Cloning a `Pool` is cheap and yields another handle to the same pool.
///
/// # Example
///
/// ```rust,ignore
/// use dbroute_pool::{Pool, PoolConfig};
///
/// let pool_config = PoolConfig::new()
///     .min_connections(5)
///     .max_connections(20);
///
/// let pool = Pool::builder()
///     .pool_config(pool_config)
///     .connector(connector)
///     .build()
///     .await?;
///
/// let conn = pool.get().await?;
/// // Use connection...
/// ```
#[derive(Clone)]
pub struct Pool {
    pub(crate) inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    /// Pool configuration.
    pub(crate) config: PoolConfig,

    /// Opens new physical connections.
    connector: Arc<dyn Connector>,

    /// Live/idle accounting and the idle set.
    pub(crate) state: Mutex<PoolState>,

    /// Signalled when a connection becomes idle or a slot frees up.
    pub(crate) available: Notify,

    /// Signalled whenever a lease ends.
    drained: Notify,

    /// Counter for generating connection IDs.
    next_connection_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    pub(crate) metrics: Mutex<PoolMetricsInner>,

    /// Stops the background reaper.
    pub(crate) cancel: CancellationToken,
}

pub(crate) struct PoolState {
    /// Idle connections, most recently used at the back.
    pub(crate) idle: VecDeque<IdleConnection>,
    /// Idle + leased + being created.
    pub(crate) live: u32,
    /// Leased or being created for a caller.
    pub(crate) in_use: u32,
    pub(crate) closed: bool,
}

pub(crate) struct IdleConnection {
    pub(crate) conn: DynConnection,
    pub(crate) metadata: ConnectionMetadata,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
pub(crate) struct PoolMetricsInner {
    pub(crate) connections_created: u64,
    pub(crate) connections_closed: u64,
    pub(crate) connections_evicted: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    health_checks_performed: u64,
    health_checks_failed: u64,
    resets_performed: u64,
    resets_failed: u64,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A reserved live slot that has no connection attached yet.
///
/// Dropping it (error, timeout or cancellation mid-creation) gives the slot
/// back and wakes one waiter.
pub(crate) struct SlotGuard {
    pool: Arc<PoolInner>,
    leased: bool,
    armed: bool,
}

impl SlotGuard {
    pub(crate) fn new(pool: Arc<PoolInner>, leased: bool) -> Self {
        Self {
            pool,
            leased,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.pool.state.lock();
            state.live = state.live.saturating_sub(1);
            if self.leased {
                state.in_use = state.in_use.saturating_sub(1);
            }
        }
        self.pool.available.notify_one();
        if self.leased {
            self.pool.drained.notify_waiters();
        }
    }
}

enum Checkout {
    Idle(IdleConnection),
    Create,
}

impl PoolInner {
    fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) async fn create_connection(&self) -> Result<IdleConnection, PoolError> {
        let timeout = self.config.create_timeout;
        let conn = match tokio::time::timeout(timeout, self.connector.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                tracing::warn!(pool = %self.name(), error = %e, "failed to open connection");
                return Err(PoolError::Connect(e));
            }
            Err(_) => {
                tracing::warn!(
                    pool = %self.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "connection creation timed out"
                );
                return Err(PoolError::Timeout {
                    phase: TimeoutPhase::Create,
                    timeout,
                });
            }
        };

        let metadata = ConnectionMetadata::new(self.next_connection_id());
        self.metrics.lock().connections_created += 1;
        tracing::debug!(
            pool = %self.name(),
            connection_id = metadata.id,
            "opened new connection"
        );
        Ok(IdleConnection { conn, metadata })
    }

    pub(crate) async fn check_health(&self, conn: &mut dyn Connection) -> HealthCheckResult {
        let result = HealthCheckResult::probe(conn, &self.config.validation_query).await;
        let mut metrics = self.metrics.lock();
        metrics.health_checks_performed += 1;
        if !result.is_healthy() {
            metrics.health_checks_failed += 1;
        }
        result
    }

    /// Put a connection back in the idle set, or discard it.
    fn finish_lease(&self, conn: DynConnection, mut metadata: ConnectionMetadata, invalid: bool) {
        let connection_id = metadata.id;
        let discarded = {
            let mut state = self.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
            if invalid || state.closed || conn.is_broken() {
                Some(conn)
            } else {
                metadata.mark_idle();
                state.idle.push_back(IdleConnection { conn, metadata });
                None
            }
        };

        if let Some(conn) = discarded {
            // Close before freeing the slot so live never overshoots max.
            drop(conn);
            {
                let mut state = self.state.lock();
                state.live = state.live.saturating_sub(1);
            }
            self.metrics.lock().connections_closed += 1;
            tracing::debug!(
                pool = %self.name(),
                connection_id,
                "discarded connection on release"
            );
        } else {
            tracing::trace!(
                pool = %self.name(),
                connection_id,
                "returned connection to pool"
            );
        }

        self.available.notify_one();
        self.drained.notify_waiters();
    }

    async fn recycle(&self, mut conn: DynConnection, metadata: ConnectionMetadata, mut invalid: bool) {
        if !invalid && self.config.reset_on_return && !conn.is_broken() {
            let reset = conn.reset().await;
            let mut metrics = self.metrics.lock();
            metrics.resets_performed += 1;
            if let Err(e) = reset {
                metrics.resets_failed += 1;
                tracing::warn!(
                    pool = %self.name(),
                    connection_id = metadata.id,
                    error = %e,
                    "connection reset failed"
                );
                invalid = true;
            }
        }
        self.finish_lease(conn, metadata, invalid);
    }

    /// Create connections until `target` are live.
    pub(crate) async fn fill_to(self: &Arc<Self>, target: u32) -> Result<u32, PoolError> {
        let target = target.min(self.config.max_connections);
        let mut created = 0;
        loop {
            let slot = {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                if state.live >= target {
                    break;
                }
                state.live += 1;
                SlotGuard::new(Arc::clone(self), false)
            };

            let idle = self.create_connection().await?;
            {
                let mut state = self.state.lock();
                if state.closed {
                    // slot guard drop gives the slot back
                    return Err(PoolError::PoolClosed);
                }
                state.idle.push_back(idle);
            }
            slot.disarm();
            created += 1;
            self.available.notify_one();
        }
        Ok(created)
    }
}

impl Pool {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a new pool with the given configuration and connector.
    ///
    /// No connections are opened here; call [`warm_up`](Self::warm_up) to
    /// pre-create `min_connections`. The background reaper is started when
    /// `reaper_interval` is set.
    pub async fn new(config: PoolConfig, connector: Arc<dyn Connector>) -> Result<Self, PoolError> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            config: config.clone(),
            connector,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(config.max_connections as usize),
                live: 0,
                in_use: 0,
                closed: false,
            }),
            available: Notify::new(),
            drained: Notify::new(),
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
            cancel: CancellationToken::new(),
        });

        if let Some(interval) = config.reaper_interval {
            crate::reaper::spawn(&inner, interval);
        }

        tracing::info!(
            pool = %config.name,
            min = config.min_connections,
            max = config.max_connections,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Open connections until `min_connections` are live.
    ///
    /// Each connection is bounded by `create_timeout`; the first failure is
    /// returned.
    pub async fn warm_up(&self) -> Result<(), PoolError> {
        let created = self.inner.fill_to(self.inner.config.min_connections).await?;
        tracing::debug!(pool = %self.inner.name(), created, "pool warmed up");
        Ok(())
    }

    /// Get a connection, waiting up to the configured `acquire_timeout`.
    pub async fn get(&self) -> Result<PooledConnection, PoolError> {
        self.acquire(self.inner.config.acquire_timeout).await
    }

    /// Get a connection, waiting up to `timeout`.
    ///
    /// An idle connection is reused when one is available, otherwise a new
    /// one is created if the pool is below `max_connections`. At capacity the
    /// calling task is suspended until a connection is released. A zero
    /// `timeout` never waits and fails with [`PoolError::Exhausted`] instead.
    ///
    /// Dropping the returned future cancels the acquisition without leaking a
    /// slot.
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledConnection, PoolError> {
        tracing::trace!(pool = %self.inner.name(), "acquiring connection from pool");

        let result = if timeout.is_zero() {
            self.checkout(false).await
        } else {
            match tokio::time::timeout(timeout, self.checkout(true)).await {
                Ok(result) => result,
                Err(_) => Err(PoolError::Timeout {
                    phase: TimeoutPhase::Acquire,
                    timeout,
                }),
            }
        };

        let mut metrics = self.inner.metrics.lock();
        match &result {
            Ok(_) => metrics.checkouts_successful += 1,
            Err(e) => {
                metrics.checkouts_failed += 1;
                tracing::debug!(pool = %self.inner.name(), error = %e, "checkout failed");
            }
        }
        result
    }

    async fn checkout(&self, wait: bool) -> Result<PooledConnection, PoolError> {
        let inner = &self.inner;
        loop {
            let notified = inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                if let Some(idle) = state.idle.pop_back() {
                    state.in_use += 1;
                    Some(Checkout::Idle(idle))
                } else if state.live < inner.config.max_connections {
                    state.live += 1;
                    state.in_use += 1;
                    Some(Checkout::Create)
                } else {
                    None
                }
            };

            match next {
                Some(Checkout::Idle(idle)) => {
                    let slot = SlotGuard::new(Arc::clone(inner), true);
                    // Declared after the slot so a cancelled probe closes the
                    // connection before the slot is handed back.
                    let mut idle = idle;
                    if inner.config.test_on_checkout {
                        let health = inner.check_health(idle.conn.as_mut()).await;
                        if let HealthCheckResult::Unhealthy { reason, .. } = health {
                            tracing::warn!(
                                pool = %inner.name(),
                                connection_id = idle.metadata.id,
                                reason = %reason,
                                "idle connection failed validation, discarding"
                            );
                            drop(idle);
                            inner.metrics.lock().connections_closed += 1;
                            drop(slot);
                            continue;
                        }
                    }
                    slot.disarm();
                    return Ok(PooledConnection::new(idle, Arc::clone(inner)));
                }
                Some(Checkout::Create) => {
                    let slot = SlotGuard::new(Arc::clone(inner), true);
                    let mut idle = inner.create_connection().await?;
                    if inner.config.test_on_checkout {
                        let health = inner.check_health(idle.conn.as_mut()).await;
                        if let HealthCheckResult::Unhealthy { reason, .. } = health {
                            inner.metrics.lock().connections_closed += 1;
                            return Err(PoolError::ValidationFailed { reason });
                        }
                    }
                    slot.disarm();
                    return Ok(PooledConnection::new(idle, Arc::clone(inner)));
                }
                None if !wait => {
                    return Err(PoolError::Exhausted {
                        max: inner.config.max_connections,
                    });
                }
                None => notified.await,
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping it, except that the session reset runs on the
    /// calling task.
    pub async fn release(&self, conn: PooledConnection) {
        conn.release().await;
    }

    /// Probe a leased connection.
    ///
    /// A failing connection is marked invalid and will be discarded on
    /// release.
    pub async fn validate(&self, conn: &mut PooledConnection) -> bool {
        let Some(raw) = conn.conn.as_mut() else {
            return false;
        };
        match self.inner.check_health(raw.as_mut()).await {
            HealthCheckResult::Healthy { .. } => true,
            HealthCheckResult::Unhealthy { reason, .. } => {
                tracing::warn!(
                    pool = %self.inner.name(),
                    connection_id = conn.metadata.id,
                    reason = %reason,
                    "leased connection failed validation"
                );
                conn.invalidate();
                false
            }
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.idle.len() as u32,
            in_use: state.in_use,
            total: state.live,
            max: self.inner.config.max_connections,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            connections_evicted: inner.connections_evicted,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            health_checks_performed: inner.health_checks_performed,
            health_checks_failed: inner.health_checks_failed,
            resets_performed: inner.resets_performed,
            resets_failed: inner.resets_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool.
    ///
    /// New acquisitions fail with [`PoolError::PoolClosed`] and pending ones
    /// are woken. Outstanding leases get up to `drain_timeout` to come back,
    /// then every idle connection is closed. Leases returned later are
    /// discarded.
    pub async fn close(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        inner.cancel.cancel();
        inner.available.notify_waiters();

        let drain = async {
            loop {
                let notified = inner.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if inner.state.lock().in_use == 0 {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(inner.config.drain_timeout, drain).await.is_err() {
            tracing::warn!(
                pool = %inner.name(),
                outstanding = inner.state.lock().in_use,
                "drain timed out with connections still leased"
            );
        }

        let idle: Vec<IdleConnection> = {
            let mut state = inner.state.lock();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.live = state.live.saturating_sub(drained.len() as u32);
            drained
        };
        inner.metrics.lock().connections_closed += idle.len() as u64;
        let closed = idle.len();
        drop(idle);

        tracing::info!(pool = %inner.name(), closed, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.config.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .pool_config(pool_config)
///     .connector(connector)
///     .build()
///     .await?;
/// ```
pub struct PoolBuilder {
    pool_config: PoolConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl PoolBuilder {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            pool_config: PoolConfig::default(),
            connector: None,
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the connector used to open connections.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the pool name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.pool_config.name = name.into();
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.pool_config.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.acquire_timeout = timeout;
        self
    }

    /// Set the connection creation timeout.
    #[must_use]
    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.create_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = timeout;
        self
    }

    /// Enable or disable the session reset on return.
    #[must_use]
    pub fn reset_on_return(mut self, enabled: bool) -> Self {
        self.pool_config.reset_on_return = enabled;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool, PoolError> {
        let connector = self
            .connector
            .ok_or_else(|| PoolError::Config("no connector configured".into()))?;
        Pool::new(self.pool_config, connector).await
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Connections closed by the idle reaper.
    pub connections_evicted: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed, etc.).
    pub checkouts_failed: u64,
    /// Health checks performed.
    pub health_checks_performed: u64,
    /// Health checks that failed.
    pub health_checks_failed: u64,
    /// Connection resets performed.
    pub resets_performed: u64,
    /// Connection resets that failed.
    pub resets_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate health check success rate (0.0 to 1.0).
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let successful = self.health_checks_performed - self.health_checks_failed;
        successful as f64 / self.health_checks_performed as f64
    }
}

/// A connection leased from the pool.
///
/// When dropped, the connection is returned to the pool (or discarded if it
/// was invalidated). Use [`detach()`](PooledConnection::detach) to take it
/// out of the pool for good.
pub struct PooledConnection {
    conn: Option<DynConnection>,
    metadata: ConnectionMetadata,
    invalid: bool,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(idle: IdleConnection, pool: Arc<PoolInner>) -> Self {
        let IdleConnection { conn, mut metadata } = idle;
        metadata.mark_checked_out();
        tracing::trace!(
            pool = %pool.name(),
            connection_id = metadata.id,
            checkouts = metadata.checkout_count,
            "connection checked out"
        );
        Self {
            conn: Some(conn),
            metadata,
            invalid: false,
            pool,
        }
    }

    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    /// Mark the connection broken so it is discarded on release.
    pub fn invalidate(&mut self) {
        self.invalid = true;
        self.metadata.state = ConnectionState::Invalid;
    }

    /// Whether the connection has been marked broken.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Return the connection to the pool, running the session reset on the
    /// calling task.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool
                .recycle(conn, self.metadata.clone(), self.invalid)
                .await;
        }
    }

    /// Detach the connection from the pool.
    ///
    /// The pool forgets the connection and frees its slot; the caller now
    /// owns the physical connection.
    pub fn detach(mut self) -> Option<DynConnection> {
        let conn = self.conn.take()?;
        {
            let mut state = self.pool.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
            state.live = state.live.saturating_sub(1);
        }
        self.pool.available.notify_one();
        self.pool.drained.notify_waiters();
        tracing::debug!(
            pool = %self.pool.name(),
            connection_id = self.metadata.id,
            "connection detached from pool"
        );
        Some(conn)
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.name())
            .field("metadata", &self.metadata)
            .field("invalid", &self.invalid)
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("connection is only taken when the lease ends")
    }
}

impl DerefMut for PooledConnection {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection is only taken when the lease ends")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let metadata = self.metadata.clone();
        let needs_reset = self.pool.config.reset_on_return && !self.invalid;
        if needs_reset {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let pool = Arc::clone(&self.pool);
                let invalid = self.invalid;
                handle.spawn(async move {
                    pool.recycle(conn, metadata, invalid).await;
                });
                return;
            }
            // No runtime to run the reset on; never hand out an unreset session.
            self.pool.finish_lease(conn, metadata, true);
            return;
        }
        self.pool.finish_lease(conn, metadata, self.invalid);
    }
}
