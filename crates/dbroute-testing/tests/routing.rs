//! End-to-end routing against the scripted driver.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use dbroute::{
    ConnectionParameters, Error, PoolError, PoolRegistry, ReadOnlyHint, ReplicaSelection, Role,
    RouterConfig, RoutingConnectionSource, RoutingContext,
};
use dbroute_testing::{MockDriver, init_tracing};
use futures_util::future::join_all;

fn params(host: &str) -> ConnectionParameters {
    ConnectionParameters::new()
        .host(host)
        .pool_size(1, 4)
        .connect_timeout(Duration::from_secs(1))
        .drain_timeout(Duration::from_millis(200))
}

fn config(replicas: u16) -> RouterConfig {
    (0..replicas).fold(RouterConfig::new(params("primary")), |config, id| {
        config.replica(Role::replica(id), params(&format!("replica-{id}")))
    })
}

async fn source(driver: &MockDriver, config: &RouterConfig) -> RoutingConnectionSource {
    init_tracing();
    RoutingConnectionSource::from_config(config, Arc::new(driver.clone()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_startup_prewarms_every_role() {
    let driver = MockDriver::new();
    let source = source(&driver, &config(2)).await;

    for host in ["primary", "replica-0", "replica-1"] {
        assert_eq!(driver.endpoint(host).live(), 1, "{host}");
    }
    assert_eq!(source.registry().roles().len(), 3);
    source.shutdown().await;
    assert_eq!(driver.live(), 0);
}

#[tokio::test]
async fn test_unreachable_replica_fails_startup_and_closes_everything() {
    let driver = MockDriver::new();
    driver.endpoint("replica-1").set_unreachable(true);

    let err = RoutingConnectionSource::from_config(&config(2), Arc::new(driver.clone()))
        .await
        .unwrap_err();

    assert!(!err.is_recoverable());
    match err {
        Error::StartupFailed { role, source } => {
            assert_eq!(role, Role::replica(1));
            assert!(matches!(source, PoolError::Connect(_)));
        }
        other => panic!("expected StartupFailed, got {other:?}"),
    }
    assert_eq!(driver.live(), 0);
}

#[tokio::test]
async fn test_slow_primary_fails_startup() {
    let driver = MockDriver::new();
    driver
        .endpoint("primary")
        .set_connect_delay(Some(Duration::from_millis(200)));
    let config = RouterConfig::new(params("primary").connect_timeout(Duration::from_millis(20)));

    let result = PoolRegistry::from_config(&config, Arc::new(driver.clone())).await;
    assert!(matches!(
        result,
        Err(Error::StartupFailed {
            role: Role::Primary,
            source: PoolError::Timeout { .. },
        })
    ));
}

#[tokio::test]
async fn test_reads_spread_and_writes_stay_on_primary() {
    let driver = MockDriver::new();
    let source = source(&driver, &config(2)).await;

    let mut replica_roles = Vec::new();
    for _ in 0..4 {
        let conn = source.acquire(&RoutingContext::read_only()).await.unwrap();
        replica_roles.push(conn.role());
    }
    assert_eq!(
        replica_roles,
        vec![
            Role::replica(0),
            Role::replica(1),
            Role::replica(0),
            Role::replica(1)
        ]
    );

    for ctx in [RoutingContext::read_write(), RoutingContext::new()] {
        let conn = source.acquire(&ctx).await.unwrap();
        assert_eq!(conn.role(), Role::Primary);
    }
    source.shutdown().await;
}

#[tokio::test]
async fn test_reads_fall_back_to_primary_without_replicas() {
    let driver = MockDriver::new();
    let source = source(&driver, &config(0)).await;

    let conn = source.acquire(&RoutingContext::read_only()).await.unwrap();
    assert_eq!(conn.role(), Role::Primary);
}

#[tokio::test]
async fn test_transaction_acquisitions_share_one_role() {
    let driver = MockDriver::new();
    let source = source(&driver, &config(3)).await;

    for read_only in [true, false] {
        let tx = source.begin_transaction(read_only);
        let mut roles = Vec::new();
        for _ in 0..6 {
            let conn = source.acquire(&tx).await.unwrap();
            roles.push(conn.role());
        }
        assert!(roles.iter().all(|role| *role == roles[0]), "{roles:?}");
        if !read_only {
            assert_eq!(roles[0], Role::Primary);
        }
        source.commit(tx).unwrap();
    }

    // Interleaved reads outside the transaction keep rotating.
    let tx = source.begin_transaction(true);
    let pinned = source.acquire(&tx).await.unwrap().role();
    let other = source.acquire(&RoutingContext::read_only()).await.unwrap().role();
    assert_ne!(pinned, other);
    assert_eq!(source.acquire(&tx).await.unwrap().role(), pinned);
    source.rollback(tx).unwrap();
}

#[tokio::test]
async fn test_static_affinity_keeps_transaction_on_replica() {
    let driver = MockDriver::new();
    let config = config(3).replica_selection(ReplicaSelection::Static);
    let source = source(&driver, &config).await;

    let tx = source.begin_transaction(true);
    let role = source.acquire(&tx).await.unwrap().role();
    assert!(!role.is_primary());
    for _ in 0..5 {
        assert_eq!(source.acquire(&tx).await.unwrap().role(), role);
    }
    source.commit(tx).unwrap();
}

#[tokio::test]
async fn test_late_hint_is_honoured_before_first_acquire() {
    let driver = MockDriver::new();
    let source = source(&driver, &config(1)).await;

    let mut ctx = RoutingContext::new();
    assert_eq!(ctx.hint(), ReadOnlyHint::Unknown);
    assert!(ctx.resolve_hint(true));
    assert_eq!(source.acquire(&ctx).await.unwrap().role(), Role::REPLICA);
}

#[tokio::test]
async fn test_replica_default_from_config() {
    let driver = MockDriver::new();
    let mut config = config(1);
    config.default_role = Role::REPLICA;
    config.allow_replica_default = true;
    let source = source(&driver, &config).await;

    assert_eq!(source.acquire(&RoutingContext::new()).await.unwrap().role(), Role::REPLICA);
    assert_eq!(
        source.acquire(&RoutingContext::read_write()).await.unwrap().role(),
        Role::Primary
    );
}

#[tokio::test]
async fn test_config_from_json() {
    let driver = MockDriver::new();
    let config: RouterConfig = serde_json::from_value(serde_json::json!({
        "replica_selection": "static",
        "roles": {
            "primary": { "host": "primary", "max_pool_size": 2, "min_pool_size": 1 },
            "replica": { "host": "replica", "max_pool_size": 2, "min_pool_size": 0 }
        }
    }))
    .unwrap();
    let source = source(&driver, &config).await;

    assert_eq!(driver.endpoint("primary").live(), 1);
    assert_eq!(driver.endpoint("replica").live(), 0);
    assert_eq!(source.acquire(&RoutingContext::read_only()).await.unwrap().role(), Role::REPLICA);
}

#[tokio::test]
async fn test_driver_receives_role_options() {
    let driver = MockDriver::new();
    let primary = ConnectionParameters::from_connection_string(
        "Server=primary;Min Pool Size=1;SSL=false;tcpKeepAlive=true;tcpNoDelay=true",
    )
    .unwrap();
    let replica = params("replica-0").option("useServerPrepareStatement", "true");
    let config = RouterConfig::new(primary).replica(Role::REPLICA, replica);
    let source = source(&driver, &config).await;

    let options = driver.endpoint("primary").options();
    assert_eq!(options["SSL"], "false");
    assert_eq!(options["tcpKeepAlive"], "true");
    assert_eq!(options["tcpNoDelay"], "true");
    let options = driver.endpoint("replica-0").options();
    assert_eq!(options.len(), 1);
    assert_eq!(options["useServerPrepareStatement"], "true");
    source.shutdown().await;
}

#[tokio::test]
async fn test_exhausted_role_surfaces_pool_error() {
    let driver = MockDriver::new();
    let config = RouterConfig::new(
        params("primary")
            .pool_size(1, 1)
            .acquire_timeout(Duration::from_millis(30)),
    );
    let source = source(&driver, &config).await;
    let _held = source.acquire(&RoutingContext::read_write()).await.unwrap();

    let err = source
        .acquire(&RoutingContext::read_write())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::Timeout { .. })));
    assert!(err.is_recoverable());

    let err = source
        .acquire_with_timeout(&RoutingContext::read_write(), Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::Exhausted { max: 1 })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routing_respects_pool_bounds() {
    let driver = MockDriver::new();
    let source = source(&driver, &config(2)).await;

    let tasks = (0..200).map(|i| {
        let source = source.clone();
        tokio::spawn(async move {
            let ctx = match i % 3 {
                0 => RoutingContext::read_only(),
                1 => RoutingContext::read_write(),
                _ => RoutingContext::new(),
            };
            let conn = source.acquire(&ctx).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
            conn.role()
        })
    });
    let roles: Vec<Role> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(roles.iter().filter(|r| r.is_primary()).count(), 133);
    for host in ["primary", "replica-0", "replica-1"] {
        assert!(driver.endpoint(host).max_live() <= 4, "{host}");
    }
    source.shutdown().await;
    assert_eq!(driver.live(), 0);
}

#[tokio::test]
async fn test_shutdown_waits_for_leases() {
    let driver = MockDriver::new();
    let source = source(&driver, &config(1)).await;
    let conn = source.acquire(&RoutingContext::read_only()).await.unwrap();

    let shutdown = {
        let source = source.clone();
        tokio::spawn(async move { source.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!shutdown.is_finished());

    conn.release().await;
    shutdown.await.unwrap();
    assert_eq!(driver.live(), 0);
    assert!(matches!(
        source.acquire(&RoutingContext::read_only()).await,
        Err(Error::Pool(PoolError::PoolClosed))
    ));
}
