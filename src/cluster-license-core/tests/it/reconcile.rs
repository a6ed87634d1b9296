//! Single reconciliation passes: idempotence, conflicts, transient failures.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use cluster_license_core::{
    ControllerError, ReconcileOutcome, ResourceStore, ViolationType, DEFAULT_STATUS_ANNOTATION,
};

use crate::support::{config, encode, license, record_key, FaultyStore, Fixture};

#[tokio::test]
async fn second_pass_on_unchanged_inputs_writes_nothing() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1", "node-2"], "2");
    fx.install(Some(encode(&fx.signed(license(3))))).await;
    let controller = fx.controller();

    let first = controller.reconcile().await.unwrap();
    let second = controller.reconcile().await.unwrap();

    let (ReconcileOutcome::Written(a), ReconcileOutcome::Unchanged(b)) =
        (&first.outcome, &second.outcome)
    else {
        panic!("unexpected outcomes: {first:?} / {second:?}");
    };
    assert_eq!(a, b);
    assert_eq!(a.violation_type(), ViolationType::NoViolation);
    assert_eq!(fx.store.status_writes(), 1);
    assert!(first.next_transition.is_some());
}

#[tokio::test]
async fn status_follows_node_count_across_passes() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1", "node-2", "node-3"], "1");
    fx.install(Some(encode(&fx.signed(license(3))))).await;
    let controller = fx.controller();

    let kind = |pass: cluster_license_core::Reconciliation| {
        pass.outcome.status().map(|s| s.violation_type())
    };

    assert_eq!(kind(controller.reconcile().await.unwrap()), Some(ViolationType::NoViolation));

    fx.add_nodes(&["node-4"], "1");
    assert_eq!(
        kind(controller.reconcile().await.unwrap()),
        Some(ViolationType::NodeCountLimitExceeded)
    );

    fx.store.remove_node("node-4").unwrap();
    assert_eq!(kind(controller.reconcile().await.unwrap()), Some(ViolationType::NoViolation));
    assert_eq!(fx.store.status_writes(), 3);
}

#[tokio::test]
async fn deleted_record_is_unobserved_without_writes() {
    let fx = Fixture::new();
    fx.install(Some(Vec::new())).await;
    let controller = fx.controller();
    controller.reconcile().await.unwrap();

    fx.store.delete_license(&record_key()).await.unwrap();
    let pass = controller.reconcile().await.unwrap();

    assert_eq!(pass.outcome, ReconcileOutcome::Unobserved);
    assert_eq!(fx.store.status_writes(), 1);
}

#[tokio::test]
async fn conflicting_write_is_rerun_against_fresh_record() {
    let fx = Fixture::new();
    fx.install(Some(Vec::new())).await;
    let store = Arc::new(FaultyStore::new(Arc::clone(&fx.store)).with_conflicts(2));
    let controller = fx.controller_on(Arc::clone(&store) as Arc<dyn ResourceStore>);

    let pass = controller.reconcile().await.unwrap();

    assert!(matches!(pass.outcome, ReconcileOutcome::Written(_)));
    assert_eq!(store.write_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(fx.store.status_writes(), 1);
}

#[tokio::test]
async fn endless_conflicts_give_up_after_configured_attempts() {
    let fx = Fixture::new();
    fx.install(Some(Vec::new())).await;
    let store = Arc::new(FaultyStore::new(Arc::clone(&fx.store)).with_conflicts(u32::MAX));
    let controller = fx.controller_on(Arc::clone(&store) as Arc<dyn ResourceStore>);

    let err = controller.reconcile().await.unwrap_err();

    let attempts = config().max_conflict_retries;
    assert!(matches!(err, ControllerError::ConflictRetriesExhausted { attempts: a } if a == attempts));
    assert_eq!(fx.store.status_writes(), 0);
    assert!(fx.stored_status().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn transient_outage_is_retried_within_the_pass() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1"], "1");
    fx.install(Some(encode(&fx.signed(license(3))))).await;
    let store = Arc::new(FaultyStore::new(Arc::clone(&fx.store)).with_outages(2));
    let controller = fx.controller_on(store as Arc<dyn ResourceStore>);

    let pass = controller.reconcile().await.unwrap();

    assert_eq!(
        pass.outcome.status().map(|s| s.violation_type()),
        Some(ViolationType::NoViolation)
    );
}

#[tokio::test(start_paused = true)]
async fn outage_beyond_retry_budget_surfaces_as_store_error() {
    let fx = Fixture::new();
    fx.install(Some(Vec::new())).await;
    let store = Arc::new(FaultyStore::new(Arc::clone(&fx.store)).with_outages(u32::MAX));
    let controller = fx.controller_on(store as Arc<dyn ResourceStore>);

    let err = controller.reconcile().await.unwrap_err();

    assert!(matches!(err, ControllerError::Store(ref e) if e.is_transient()));
    assert!(fx.stored_status().await.is_none());
}

#[tokio::test]
async fn record_updates_cannot_overwrite_status() {
    let fx = Fixture::new();
    fx.install(Some(Vec::new())).await;
    fx.controller().reconcile().await.unwrap();
    let written = fx.stored_status().await.unwrap();

    let mut forged = fx.store.get_license(&record_key()).await.unwrap().unwrap();
    forged
        .annotations
        .insert(DEFAULT_STATUS_ANNOTATION.into(), r#"{"violation":{"type":"NoViolation"}}"#.into());
    fx.store.update_license(forged).await.unwrap();

    assert_eq!(fx.stored_status().await.unwrap(), written);
}
