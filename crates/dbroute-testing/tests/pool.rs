//! Pool behaviour against the scripted driver.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use dbroute_pool::{Pool, PoolConfig, PoolError, TimeoutPhase};
use dbroute_testing::{MockConnector, init_tracing};
use tokio_test::{assert_err, assert_ok};

async fn pool(connector: &MockConnector, config: PoolConfig) -> Pool {
    init_tracing();
    Pool::new(config, Arc::new(connector.clone())).await.unwrap()
}

fn small() -> PoolConfig {
    PoolConfig::new()
        .min_connections(1)
        .max_connections(2)
        .reaper_interval(None)
}

#[tokio::test]
async fn test_third_acquire_times_out() {
    let connector = MockConnector::new();
    let pool = pool(&connector, small()).await;
    pool.warm_up().await.unwrap();

    let _a = pool.get().await.unwrap();
    let _b = pool.get().await.unwrap();

    let started = Instant::now();
    let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(
        err,
        PoolError::Timeout {
            phase: TimeoutPhase::Acquire,
            ..
        }
    ));
    assert!(elapsed >= Duration::from_millis(50), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "returned after {elapsed:?}");
    assert_eq!(connector.endpoint().connects(), 2);
}

#[tokio::test]
async fn test_waiter_gets_released_connection() {
    let connector = MockConnector::new();
    let pool = pool(&connector, small().reset_on_return(false)).await;

    let a = pool.get().await.unwrap();
    let _b = pool.get().await.unwrap();
    let first_id = a.metadata().id;

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(a);

    let conn = assert_ok!(waiter.await.unwrap());
    assert_eq!(conn.metadata().id, first_id);
    assert_eq!(connector.endpoint().connects(), 2);
}

#[tokio::test]
async fn test_invalidated_connection_is_closed() {
    let connector = MockConnector::new();
    let pool = pool(&connector, small()).await;

    let mut conn = pool.get().await.unwrap();
    assert_eq!(pool.status().total, 1);
    conn.invalidate();
    drop(conn);

    assert_eq!(pool.status().total, 0);
    assert_eq!(pool.status().available, 0);
    assert_eq!(connector.endpoint().live(), 0);
}

#[tokio::test]
async fn test_slow_connect_hits_create_timeout() {
    let connector = MockConnector::new();
    connector
        .endpoint()
        .set_connect_delay(Some(Duration::from_millis(200)));
    let pool = pool(
        &connector,
        small()
            .min_connections(0)
            .create_timeout(Duration::from_millis(20)),
    )
    .await;

    let err = pool.acquire(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(
        err,
        PoolError::Timeout {
            phase: TimeoutPhase::Create,
            ..
        }
    ));
    assert_eq!(pool.status().total, 0);
}

#[tokio::test]
async fn test_unreachable_endpoint_surfaces_connect_error() {
    let connector = MockConnector::new();
    connector.endpoint().set_unreachable(true);
    let pool = pool(&connector, small()).await;

    assert!(matches!(pool.warm_up().await, Err(PoolError::Connect(_))));
    assert!(matches!(pool.get().await, Err(PoolError::Connect(_))));
    assert_eq!(pool.status().total, 0);
    assert!(!PoolError::Connect("refused".into()).is_transient());
}

#[tokio::test]
async fn test_new_connection_failing_probe_is_rejected() {
    let connector = MockConnector::new();
    connector.endpoint().set_fail_ping(true);
    let pool = pool(&connector, small().min_connections(0)).await;

    let err = assert_err!(pool.get().await);
    assert!(matches!(err, PoolError::ValidationFailed { .. }));
    assert!(err.is_transient());
    assert_eq!(pool.status().total, 0);
    assert_eq!(connector.endpoint().live(), 0);
}

#[tokio::test]
async fn test_broken_idle_connections_are_replaced() {
    let connector = MockConnector::new();
    let pool = pool(&connector, small().min_connections(2)).await;
    pool.warm_up().await.unwrap();

    connector.endpoint().set_broken(true);
    let report = pool.maintain().await;
    assert_eq!(report.evicted, 2);
    assert_eq!(report.created, 2);
    assert_eq!(connector.endpoint().connects(), 4);

    connector.endpoint().set_broken(false);
    assert!(pool.maintain().await.is_empty());
    assert_eq!(pool.status().available, 2);
    assert_eq!(connector.endpoint().live(), 2);
}

#[tokio::test]
async fn test_failed_reset_discards_connection() {
    let connector = MockConnector::new();
    connector.endpoint().set_fail_reset(true);
    let pool = pool(&connector, small().min_connections(0)).await;

    let conn = assert_ok!(pool.get().await);
    conn.release().await;

    assert_eq!(pool.status().total, 0);
    assert_eq!(connector.endpoint().resets(), 1);
    assert_eq!(pool.metrics().resets_failed, 1);
}

#[tokio::test]
async fn test_close_waits_for_outstanding_lease() {
    let connector = MockConnector::new();
    let pool = pool(&connector, small()).await;
    let conn = pool.get().await.unwrap();

    let closer = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.close().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pool.is_closed());
    assert!(!closer.is_finished());
    assert!(matches!(pool.get().await, Err(PoolError::PoolClosed)));

    drop(conn);
    closer.await.unwrap();
    assert_eq!(connector.endpoint().live(), 0);
    assert_eq!(pool.status().total, 0);
}

#[tokio::test]
async fn test_close_wakes_waiters() {
    let connector = MockConnector::new();
    let pool = pool(
        &connector,
        small()
            .max_connections(1)
            .drain_timeout(Duration::from_millis(50)),
    )
    .await;
    let held = pool.get().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close().await;

    assert!(matches!(waiter.await.unwrap(), Err(PoolError::PoolClosed)));
    held.release().await;
    assert_eq!(connector.endpoint().live(), 0);
}
