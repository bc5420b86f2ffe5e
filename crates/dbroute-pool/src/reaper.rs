//! Idle connection reaper.
//!
//! Each pass closes idle connections above `min_connections` that have been
//! unused for longer than `idle_timeout`, drops idle connections the driver
//! reports broken, and then tops the pool back up to `min_connections`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::pool::{IdleConnection, Pool, PoolInner};

/// What a single reaper pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Idle connections closed.
    pub evicted: u32,
    /// Connections opened to restore `min_connections`.
    pub created: u32,
}

impl MaintenanceReport {
    /// Whether the pass changed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evicted == 0 && self.created == 0
    }
}

impl Pool {
    /// Run one reaper pass.
    ///
    /// Replenishment failures are logged and left for the next pass.
    pub async fn maintain(&self) -> MaintenanceReport {
        let inner = &self.inner;
        let min = inner.config.min_connections;
        let idle_timeout = inner.config.idle_timeout;

        let evicted: Vec<IdleConnection> = {
            let mut state = inner.state.lock();
            if state.closed {
                return MaintenanceReport::default();
            }
            let mut live = state.live;
            let mut evicted = Vec::new();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            // Longest-idle connections sit at the front.
            while let Some(idle) = state.idle.pop_front() {
                let expired = live > min && idle.metadata.idle_time() >= idle_timeout;
                if expired || idle.conn.is_broken() {
                    live -= 1;
                    evicted.push(idle);
                } else {
                    kept.push_back(idle);
                }
            }
            state.idle = kept;
            evicted
        };

        let mut report = MaintenanceReport {
            evicted: evicted.len() as u32,
            created: 0,
        };
        if !evicted.is_empty() {
            let count = evicted.len();
            drop(evicted);
            {
                let mut state = inner.state.lock();
                state.live = state.live.saturating_sub(count as u32);
            }
            // Acquires that parked while the evicted connections were closing
            // now have free slots.
            for _ in 0..count {
                inner.available.notify_one();
            }
            let mut metrics = inner.metrics.lock();
            metrics.connections_evicted += count as u64;
            metrics.connections_closed += count as u64;
        }

        match inner.fill_to(min).await {
            Ok(created) => report.created = created,
            Err(e) => tracing::warn!(
                pool = %inner.config.name,
                error = %e,
                "failed to restore minimum idle connections"
            ),
        }

        report
    }
}

/// Start the background reaper for `inner`.
///
/// The task holds only a weak reference between passes and stops when the
/// pool is closed or dropped.
pub(crate) fn spawn(inner: &Arc<PoolInner>, interval: Duration) {
    let weak = Arc::downgrade(inner);
    let cancel = inner.cancel.clone();
    let name = inner.config.name.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let report = Pool { inner }.maintain().await;
            if !report.is_empty() {
                tracing::debug!(
                    pool = %name,
                    evicted = report.evicted,
                    created = report.created,
                    "reaper pass"
                );
            }
        }

        tracing::debug!(pool = %name, "idle reaper stopped");
    });
}
