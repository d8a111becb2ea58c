//! Cluster lifecycle integration tests.
//!
//! Drives the reconciler against the in-memory store through the full flow:
//! 1. First pass creates every resource and moves the cluster to Creating
//! 2. Passes while tablets are unready requeue after the recheck interval
//! 3. Once every stateful set reports ready, the cluster moves to Ready
//! 4. Further passes touch nothing


use std::sync::Arc;
use std::time::Duration;

use harness::{cell, reference_cluster, Fixture, NS};
use tokio::sync::watch;
use vto_operator::controller::{ReconcileError, LOCKSERVER_READY};
use vto_operator::generator::resources::StatefulSet;
use vto_operator::normalizer::{SanityError, ValidationError};
use vto_operator::store::{Kind, StoreExt, StoreOp};
use vto_operator::worker::ReconcileWorker;
use vto_reconcile::{Outcome, READINESS_RECHECK_INTERVAL};
use vto_topology::{ClusterPhase, Lockserver, ObjectKey};

#[tokio::test]
async fn test_cluster_reaches_ready() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;

    // Pass 1: everything is created, phase moves to Creating.
    let outcome = fixture.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome, Outcome::done());
    assert_eq!(fixture.cluster(&key).await.phase(), ClusterPhase::Creating);

    assert_eq!(fixture.store.count(Kind::Service).await, 3);
    assert_eq!(fixture.store.count(Kind::Deployment).await, 2);
    assert_eq!(fixture.store.count(Kind::StatefulSet).await, 4);
    assert_eq!(fixture.store.count(Kind::Job).await, 2);

    // Pass 2: nothing is ready yet.
    let outcome = fixture.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome, Outcome::requeue_after(READINESS_RECHECK_INTERVAL));
    assert_eq!(fixture.cluster(&key).await.phase(), ClusterPhase::Creating);

    // Pass 3: pods report ready.
    fixture.mark_stateful_sets_ready().await;
    let outcome = fixture.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome, Outcome::done());
    assert_eq!(fixture.cluster(&key).await.phase(), ClusterPhase::Ready);

    // Pass 4: steady state.
    fixture.store.reset_calls();
    let outcome = fixture.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome, Outcome::done());
    assert_eq!(fixture.store.calls(StoreOp::Create), 0);
    assert_eq!(fixture.store.calls(StoreOp::Update), 0);
    assert_eq!(fixture.store.calls(StoreOp::UpdateStatus), 0);
}

#[tokio::test]
async fn test_lockserver_status_is_recorded() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;

    fixture.reconciler.reconcile(&key).await.unwrap();

    let cluster = fixture.cluster(&key).await;
    let status = cluster.status.lockserver.expect("lockserver status");
    assert_eq!(status.state, LOCKSERVER_READY);
    // The stored spec keeps its reference; only the pass sees the resolved lockserver.
    assert!(cluster.spec.lockserver_ref.is_some());
    assert!(cluster.spec.lockserver.is_none());
}

#[tokio::test]
async fn test_resources_are_owned_by_cluster() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;
    fixture.reconciler.reconcile(&key).await.unwrap();

    for set in fixture.stateful_sets().await {
        let owner = set.metadata.controller_owner().expect("controller owner");
        assert_eq!(owner.kind, "VitessCluster");
        assert_eq!(owner.name, "main");
    }
}

#[tokio::test]
async fn test_only_replica_tablets_get_init_job() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;
    fixture.reconciler.reconcile(&key).await.unwrap();

    let names: Vec<String> = fixture
        .stateful_sets()
        .await
        .into_iter()
        .map(|set| set.metadata.name)
        .collect();
    assert_eq!(
        names,
        vec![
            "main-zone1-users--80-readonly",
            "main-zone1-users--80-replica",
            "main-zone1-users-80--readonly",
            "main-zone1-users-80--replica",
        ]
    );
    assert_eq!(fixture.store.count(Kind::Job).await, 2);
}

#[tokio::test]
async fn test_drifted_stateful_set_is_patched() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;
    fixture.reconciler.reconcile(&key).await.unwrap();

    let set_key = ObjectKey::new(NS, "main-zone1-users--80-replica");
    let mut drifted: StatefulSet = fixture.store.get_object(&set_key).await.unwrap();
    drifted.spec.replicas = 7;
    fixture.store.update_object(&drifted).await.unwrap();

    fixture.store.reset_calls();
    fixture.reconciler.reconcile(&key).await.unwrap();

    let restored: StatefulSet = fixture.store.get_object(&set_key).await.unwrap();
    assert_eq!(restored.spec.replicas, 2);
    assert_eq!(fixture.store.calls(StoreOp::Update), 1);
}

#[tokio::test]
async fn test_store_failure_stops_pass() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;
    fixture.store.fail_on(StoreOp::Create, Kind::Deployment).await;

    let err = fixture.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Store(_)));
    assert!(err.is_retryable());

    // The tablet service precedes the cells; nothing after the failure ran.
    assert_eq!(fixture.store.count(Kind::Service).await, 1);
    assert_eq!(fixture.store.count(Kind::StatefulSet).await, 0);
    assert_eq!(fixture.cluster(&key).await.phase(), ClusterPhase::None);

    fixture.store.clear_failures().await;
    fixture.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(fixture.store.count(Kind::StatefulSet).await, 4);
}

#[tokio::test]
async fn test_missing_cluster_is_done() {
    let fixture = Fixture::new();

    let outcome = fixture
        .reconciler
        .reconcile(&ObjectKey::new(NS, "main"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::done());
}

#[tokio::test]
async fn test_sanity_failure_creates_nothing() {
    let fixture = Fixture::new();
    let mut cluster = reference_cluster();
    cluster.spec.lockserver = Some(Lockserver::etcd2(NS, "inline", "etcd:2379", "/vitess"));
    let key = fixture.seed_with(cluster).await;
    fixture.store.reset_calls();

    let err = fixture.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Sanity(SanityError::ClusterLockserverAndRef)));
    assert_eq!(err.outcome(), Outcome::done());
    assert_eq!(fixture.store.calls(StoreOp::List), 0);
    assert_eq!(fixture.store.calls(StoreOp::Create), 0);
}

#[tokio::test]
async fn test_validation_failure_creates_nothing() {
    let fixture = Fixture::new();
    let mut cluster = reference_cluster();
    // Shard tablets live in zone1; only zone2 is left.
    cluster.spec.cells = vec![cell("zone2")];
    let key = fixture.seed_with(cluster).await;
    fixture.store.reset_calls();

    let err = fixture.reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Validation(ValidationError::NoCellForTablet { ref cell_id, .. })
            if cell_id == "zone1"
    ));
    assert!(!err.is_retryable());
    assert_eq!(fixture.store.calls(StoreOp::Create), 0);
}

async fn wait_for_phase(fixture: &Fixture, key: &ObjectKey, phase: ClusterPhase) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if fixture.cluster(key).await.phase() == phase {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "cluster never reached {}",
            phase.as_str()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_worker_drives_cluster_to_ready() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;

    let worker = ReconcileWorker::new(fixture.store.clone(), NS, Duration::from_secs(300))
        .with_backoff(Duration::from_millis(10), Duration::from_millis(100));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    wait_for_phase(&fixture, &key, ClusterPhase::Creating).await;
    assert_eq!(fixture.store.count(Kind::StatefulSet).await, 4);

    // Owned stateful set status writes wake the cluster up.
    fixture.mark_stateful_sets_ready().await;
    wait_for_phase(&fixture, &key, ClusterPhase::Ready).await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_worker_retries_store_failures() {
    let fixture = Fixture::new();
    let key = fixture.seed().await;
    fixture.store.fail_on(StoreOp::Create, Kind::StatefulSet).await;

    let store = Arc::clone(&fixture.store);
    let worker = ReconcileWorker::new(store, NS, Duration::from_secs(300))
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fixture.cluster(&key).await.phase(), ClusterPhase::None);

    fixture.store.clear_failures().await;
    wait_for_phase(&fixture, &key, ClusterPhase::Creating).await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}
