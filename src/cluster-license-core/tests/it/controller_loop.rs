//! The long-running loop: time-driven passes, recovery, shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cluster_license_core::{ControllerPhase, ResourceStore, RetryPolicy, ViolationType};

use crate::support::{config, encode, license, now, settled_on, FaultyStore, Fixture};

#[tokio::test]
async fn expiry_is_reported_without_an_external_event() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1"], "1");

    let mut doc = license(3);
    doc.not_after = now() + chrono::Duration::seconds(2);
    fx.install(Some(encode(&fx.signed(doc)))).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        async move { controller.run(shutdown).await }
    });

    settled_on(&mut rx, ViolationType::NoViolation).await;
    settled_on(&mut rx, ViolationType::Expired).await;
    assert_eq!(
        fx.stored_status().await.unwrap().violation_type(),
        ViolationType::Expired
    );

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn controller_outlives_a_store_outage() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1", "node-2"], "1");
    fx.install(Some(encode(&fx.signed(license(3))))).await;

    // Every pass makes two list_nodes calls before giving up, so six
    // failures cost three whole passes.
    let store = Arc::new(FaultyStore::new(Arc::clone(&fx.store)).with_outages(6));
    let mut cfg = config();
    cfg.store_retry = RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(5),
    };
    cfg.requeue_base_delay = Duration::from_millis(10);
    cfg.requeue_max_delay = Duration::from_millis(50);
    let controller = Arc::new(fx.controller_with(cfg, store as Arc<dyn ResourceStore>));

    let mut rx = controller.subscribe();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        async move { controller.run(shutdown).await }
    });

    let snapshot = settled_on(&mut rx, ViolationType::NoViolation).await;
    assert_eq!(snapshot.writes, 1);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let fx = Fixture::new();
    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        async move { controller.run(shutdown).await }
    });

    // No record: the first pass leaves the controller unobserved.
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.passes >= 1 && s.phase == ControllerPhase::Unobserved),
    )
    .await
    .unwrap()
    .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("run did not return after cancellation")
        .unwrap();
    assert_eq!(fx.store.status_writes(), 0);
}

#[tokio::test]
async fn record_created_after_start_is_evaluated() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1", "node-2", "node-3", "node-4"], "1");
    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        async move { controller.run(shutdown).await }
    });

    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.phase == ControllerPhase::Unobserved && s.passes >= 1),
    )
    .await
    .unwrap()
    .unwrap();

    fx.install(Some(encode(&fx.signed(license(3))))).await;
    let snapshot = settled_on(&mut rx, ViolationType::NodeCountLimitExceeded).await;
    assert_eq!(snapshot.last_status.unwrap().usage.nodes, 4);

    shutdown.cancel();
    task.await.unwrap();
}
