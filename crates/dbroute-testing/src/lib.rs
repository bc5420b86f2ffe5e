//! # dbroute-testing
//!
//! Test infrastructure for dbroute.
//!
//! Provides an in-memory driver whose endpoints can be scripted to fail:
//!
//! - **Unreachable**: `connect` is refused
//! - **Slow connect**: `connect` sleeps before succeeding
//! - **Failing probe**: `ping` returns an error
//! - **Broken**: connections report themselves broken
//! - **Failing reset**: `reset` returns an error
//!
//! Every endpoint counts connects, probes and resets, remembers the driver
//! options of the last connect request, and tracks how many of
//! its connections are alive at once, which lets tests check pool bounds
//! against the physical connections rather than the pool's own bookkeeping.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbroute_testing::MockDriver;
//!
//! let driver = MockDriver::new();
//! driver.endpoint("replica-host").set_unreachable(true);
//!
//! let result = PoolRegistry::initialize(roles, Arc::new(driver.clone())).await;
//! assert!(matches!(result, Err(Error::StartupFailed { .. })));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbroute::{ConnectionParameters, Driver};
use dbroute_pool::{BoxError, Connection, Connector, DynConnection};
use hashbrown::HashMap;
use parking_lot::Mutex;

/// Install a `tracing` subscriber for tests.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One scripted database endpoint.
#[derive(Debug, Default)]
pub struct Endpoint {
    unreachable: AtomicBool,
    fail_ping: AtomicBool,
    broken: AtomicBool,
    fail_reset: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    options: Mutex<BTreeMap<String, String>>,
    connects: AtomicU64,
    pings: AtomicU64,
    resets: AtomicU64,
    live: AtomicU32,
    max_live: AtomicU32,
    next_id: AtomicU64,
}

impl Endpoint {
    /// Refuse new connections.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make every probe fail.
    pub fn set_fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    /// Make every connection report itself broken.
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    /// Make every session reset fail.
    pub fn set_fail_reset(&self, fail: bool) {
        self.fail_reset.store(fail, Ordering::SeqCst);
    }

    /// Delay each connect by `delay`.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.connect_delay.lock() = delay;
    }

    /// Successful connects so far.
    #[must_use]
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Probes run so far.
    #[must_use]
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }

    /// Session resets run so far.
    #[must_use]
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    /// Driver options of the most recent connect request.
    #[must_use]
    pub fn options(&self) -> BTreeMap<String, String> {
        self.options.lock().clone()
    }

    /// Connections currently open.
    #[must_use]
    pub fn live(&self) -> u32 {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of connections open at the same time.
    #[must_use]
    pub fn max_live(&self) -> u32 {
        self.max_live.load(Ordering::SeqCst)
    }

    async fn open(self: &Arc<Self>) -> Result<DynConnection, BoxError> {
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(connection_id = id, live, "mock connection opened");

        Ok(Box::new(MockConnection {
            id,
            endpoint: Arc::clone(self),
        }))
    }
}

/// A connection to an [`Endpoint`].
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    endpoint: Arc<Endpoint>,
}

impl MockConnection {
    /// Connection id, unique per endpoint.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn ping(&mut self, _query: &str) -> Result<(), BoxError> {
        self.endpoint.pings.fetch_add(1, Ordering::SeqCst);
        if self.endpoint.fail_ping.load(Ordering::SeqCst) {
            return Err("server closed the connection".into());
        }
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), BoxError> {
        self.endpoint.resets.fetch_add(1, Ordering::SeqCst);
        if self.endpoint.fail_reset.load(Ordering::SeqCst) {
            return Err("session reset failed".into());
        }
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.endpoint.broken.load(Ordering::SeqCst)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.endpoint.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A [`Connector`] for a single endpoint.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    endpoint: Arc<Endpoint>,
}

impl MockConnector {
    /// Connector for a fresh endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The endpoint this connector opens connections to.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<DynConnection, BoxError> {
        self.endpoint.open().await
    }
}

/// A [`Driver`] with one scripted endpoint per host name.
///
/// Endpoints are created on first use; clones share them.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    endpoints: Arc<Mutex<HashMap<String, Arc<Endpoint>>>>,
}

impl MockDriver {
    /// Driver with no endpoints yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The endpoint for `host`, created if needed.
    pub fn endpoint(&self, host: &str) -> Arc<Endpoint> {
        Arc::clone(
            self.endpoints
                .lock()
                .entry(host.to_string())
                .or_default(),
        )
    }

    /// Connections open across all endpoints.
    #[must_use]
    pub fn live(&self) -> u32 {
        self.endpoints.lock().values().map(|e| e.live()).sum()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn connect(&self, params: &ConnectionParameters) -> Result<DynConnection, BoxError> {
        let endpoint = self.endpoint(&params.host);
        endpoint.options.lock().clone_from(&params.options);
        endpoint.open().await
    }
}
