//! Reconciliation and proxy lifecycle tests.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use proxycfg::{LocalState, ManagerError, ServiceDescriptor, ServiceKind};
use tokio::sync::mpsc::error::TryRecvError;

mod common;

use common::{eventually, recv, snapshot, spawn_run, stays_quiet, TestFactory};

const DELIVERY: Duration = Duration::from_millis(100);

fn sidecar(id: &str) -> ServiceDescriptor {
    ServiceDescriptor::connect_proxy(id, id.trim_end_matches("-sidecar"))
}

#[tokio::test]
async fn test_new_proxy_is_tracked_and_delivers_snapshots() {
    let local = Arc::new(LocalState::new());
    local.add_service(sidecar("web-sidecar"), "T1");
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let run = spawn_run(&manager);

    assert!(eventually(|| async { manager.tracked_proxies().await == vec!["web-sidecar"] }).await);
    let state = factory.latest("web-sidecar").unwrap();
    assert_eq!(state.token, "T1");

    let (mut rx, _cancel) = manager.watch("web-sidecar").await;
    assert!(state.publish(snapshot("web-sidecar", 21000)).await);

    let received = recv(&mut rx).await.unwrap();
    assert_eq!(received.proxy_id, "web-sidecar");
    assert_eq!(received.port, 21000);

    manager.close().await;
    assert_eq!(run.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_deregistered_proxy_leaves_watchers_open_and_silent() {
    let local = Arc::new(LocalState::new());
    local.add_service(sidecar("web-sidecar"), "T1");
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { !manager.tracked_proxies().await.is_empty() }).await);
    let state = factory.latest("web-sidecar").unwrap();
    let (mut rx, _cancel) = manager.watch("web-sidecar").await;
    state.publish(snapshot("web-sidecar", 1)).await;
    assert!(recv(&mut rx).await.is_some());

    local.remove_service("web-sidecar");
    assert!(eventually(|| async { manager.tracked_proxies().await.is_empty() }).await);
    assert!(state.is_closed());
    assert!(!state.publish(snapshot("web-sidecar", 2)).await);

    // No tombstone and no close: the queue is simply idle.
    assert!(stays_quiet(&mut rx, Duration::from_millis(100)).await);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(manager.watcher_count("web-sidecar").await, 1);

    manager.close().await;
}

#[tokio::test]
async fn test_only_connect_proxies_are_tracked() {
    let local = Arc::new(LocalState::new());
    local.add_service(
        ServiceDescriptor {
            id: "web".into(),
            service: "web".into(),
            port: 8080,
            ..Default::default()
        },
        "",
    );
    local.add_service(sidecar("web-sidecar"), "");
    local.add_service(
        ServiceDescriptor {
            id: "mesh-gateway".into(),
            kind: ServiceKind::MeshGateway,
            ..Default::default()
        },
        "",
    );
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { manager.tracked_proxies().await == vec!["web-sidecar"] }).await);
    assert_eq!(factory.build_count("web"), 0);
    assert_eq!(factory.build_count("mesh-gateway"), 0);

    // A proxy re-registered under a different kind is no longer tracked.
    let mut demoted = sidecar("web-sidecar");
    demoted.kind = ServiceKind::Typical;
    local.add_service(demoted, "");
    assert!(eventually(|| async { manager.tracked_proxies().await.is_empty() }).await);
    assert!(factory.latest("web-sidecar").unwrap().is_closed());

    manager.close().await;
}

#[tokio::test]
async fn test_changed_token_rebuilds_watch_state() {
    let local = Arc::new(LocalState::new());
    local.add_service(sidecar("web-sidecar"), "T1");
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { factory.build_count("web-sidecar") == 1 }).await);
    let old = factory.latest("web-sidecar").unwrap();
    let (mut rx, _cancel) = manager.watch("web-sidecar").await;

    local.add_service(sidecar("web-sidecar"), "T2");
    assert!(eventually(|| async { factory.build_count("web-sidecar") == 2 }).await);
    let new = factory.latest("web-sidecar").unwrap();
    assert_eq!(new.token, "T2");
    assert!(old.is_closed());
    assert!(!new.is_closed());

    // The closed state can no longer reach watchers; the new one can.
    assert!(!old.publish(snapshot("web-sidecar", 1)).await);
    assert!(new.publish(snapshot("web-sidecar", 2)).await);
    assert_eq!(recv(&mut rx).await.unwrap().port, 2);
    assert!(stays_quiet(&mut rx, Duration::from_millis(50)).await);

    manager.close().await;
}

#[tokio::test]
async fn test_changed_service_definition_rebuilds_watch_state() {
    let local = Arc::new(LocalState::new());
    local.add_service(sidecar("web-sidecar"), "T1");
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { factory.build_count("web-sidecar") == 1 }).await);

    // Same definition again is not a change.
    local.add_service(sidecar("web-sidecar"), "T1");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.build_count("web-sidecar"), 1);

    let mut moved = sidecar("web-sidecar");
    moved.port = 21001;
    local.add_service(moved, "T1");
    assert!(eventually(|| async { factory.build_count("web-sidecar") == 2 }).await);

    manager.close().await;
}

#[tokio::test]
async fn test_build_failure_is_isolated_and_retried_on_next_change() {
    let local = Arc::new(LocalState::new());
    let factory = TestFactory::new();
    factory.fail_build("web-sidecar", true);
    local.add_service(sidecar("web-sidecar"), "T1");
    local.add_service(sidecar("api-sidecar"), "T1");
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { manager.tracked_proxies().await == vec!["api-sidecar"] }).await);

    // No retry timer: clearing the fault alone changes nothing.
    factory.fail_build("web-sidecar", false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.tracked_proxies().await, vec!["api-sidecar"]);

    // Any registry change triggers a full pass, which retries.
    local.add_service(
        ServiceDescriptor {
            id: "web".into(),
            ..Default::default()
        },
        "",
    );
    assert!(
        eventually(|| async {
            manager.tracked_proxies().await == vec!["api-sidecar", "web-sidecar"]
        })
        .await
    );

    manager.close().await;
}

#[tokio::test]
async fn test_watch_start_failure_leaves_proxy_untracked() {
    let local = Arc::new(LocalState::new());
    let factory = TestFactory::new();
    factory.fail_watch("web-sidecar", true);
    local.add_service(sidecar("web-sidecar"), "");
    local.add_service(sidecar("api-sidecar"), "");
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { manager.tracked_proxies().await == vec!["api-sidecar"] }).await);
    let broken = factory.latest("web-sidecar").unwrap();
    assert!(broken.is_closed());

    manager.close().await;
}

#[tokio::test]
async fn test_watch_before_first_snapshot_waits() {
    let local = Arc::new(LocalState::new());
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    // Watching a proxy that does not exist yet is fine.
    let (mut rx, _cancel) = manager.watch("web-sidecar").await;
    assert!(stays_quiet(&mut rx, Duration::from_millis(50)).await);

    local.add_service(sidecar("web-sidecar"), "");
    assert!(eventually(|| async { factory.build_count("web-sidecar") == 1 }).await);
    assert!(stays_quiet(&mut rx, Duration::from_millis(50)).await);

    let state = factory.latest("web-sidecar").unwrap();
    state.publish(snapshot("web-sidecar", 7)).await;
    assert_eq!(recv(&mut rx).await.unwrap().port, 7);

    manager.close().await;
}

#[tokio::test]
async fn test_watch_after_snapshot_delivers_immediately() {
    let local = Arc::new(LocalState::new());
    local.add_service(sidecar("web-sidecar"), "");
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { factory.build_count("web-sidecar") == 1 }).await);
    let state = factory.latest("web-sidecar").unwrap();
    state.publish(snapshot("web-sidecar", 3)).await;

    let (mut rx, _cancel) = manager.watch("web-sidecar").await;
    // Already queued when watch returned.
    let seeded = rx.try_recv().unwrap();
    assert_eq!(seeded.port, 3);

    manager.close().await;
}

#[tokio::test]
async fn test_close_stops_suspended_run_loop() {
    let local = Arc::new(LocalState::new());
    local.add_service(sidecar("web-sidecar"), "");
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let run = spawn_run(&manager);

    assert!(eventually(|| async { factory.build_count("web-sidecar") == 1 }).await);
    let state = factory.latest("web-sidecar").unwrap();
    let (mut rx, _cancel) = manager.watch("web-sidecar").await;

    manager.close().await;
    let result = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("run loop did not stop")
        .unwrap();
    assert_eq!(result, Ok(()));

    assert!(state.is_closed());
    assert!(rx.recv().await.is_none());
    assert!(manager.tracked_proxies().await.is_empty());
    assert_eq!(manager.run().await, Err(ManagerError::Stopped));

    // Registry changes after close do not resurrect anything.
    local.add_service(sidecar("api-sidecar"), "");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.build_count("api-sidecar"), 0);
}

#[tokio::test]
async fn test_collaborators_are_passed_to_states() {
    let local = Arc::new(LocalState::new());
    local.add_service(sidecar("web-sidecar"), "");
    local.add_service(sidecar("api-sidecar"), "");
    let factory = TestFactory::new();
    let cache = Arc::new(common::TestCache::default());
    let manager = proxycfg::Manager::new(proxycfg::ManagerConfig {
        cache: Some(cache.clone()),
        registry: Some(local.clone()),
        source: Some(proxycfg::QuerySource::default()),
        states: Some(Arc::new(factory.clone())),
        delivery_timeout: DELIVERY,
    })
    .unwrap();
    let _run = spawn_run(&manager);

    assert!(eventually(|| async { manager.tracked_proxies().await.len() == 2 }).await);
    assert_eq!(cache.lookups.load(Ordering::SeqCst), 2);

    manager.close().await;
}

#[tokio::test]
async fn test_burst_of_changes_is_reconciled_from_final_registry() {
    let local = Arc::new(LocalState::new());
    let factory = TestFactory::new();
    let manager = common::manager(&local, &factory, DELIVERY);
    let _run = spawn_run(&manager);

    // Let the first pass finish and the loop park on the change signal.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // No await in between: the loop cannot wake until the burst is over.
    local.add_service(sidecar("a-sidecar"), "T1");
    local.add_service(sidecar("b-sidecar"), "T1");
    local.remove_service("a-sidecar");
    local.add_service(sidecar("b-sidecar"), "T2");

    assert!(eventually(|| async { manager.tracked_proxies().await == vec!["b-sidecar"] }).await);

    let b = factory.latest("b-sidecar").unwrap();
    assert_eq!(b.token, "T2");
    assert!(!b.is_closed());
    // One wake-up for the whole burst.
    assert_eq!(factory.build_count("b-sidecar"), 1);

    if let Some(a) = factory.latest("a-sidecar") {
        assert!(a.is_closed());
    }

    manager.close().await;
}
