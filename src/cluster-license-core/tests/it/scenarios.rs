//! End-to-end scenarios against a running controller.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cluster_license_core::{LicenseController, ViolationType};

use crate::support::{corrupt_signature, encode, license, settled_on, Fixture};

struct Running {
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl Running {
    fn start(controller: Arc<LicenseController>) -> Self {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { controller.run(shutdown).await }
        });
        Self { shutdown, task }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap();
    }
}

#[tokio::test]
async fn empty_license_reports_empty_license() {
    let fx = Fixture::new();
    fx.install(Some(Vec::new())).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let running = Running::start(Arc::clone(&controller));

    settled_on(&mut rx, ViolationType::EmptyLicense).await;
    let status = fx.stored_status().await.unwrap();
    assert_eq!(status.violation_type(), ViolationType::EmptyLicense);
    assert_eq!(status.license_id, None);

    running.stop().await;
}

#[tokio::test]
async fn missing_data_key_reports_empty_license() {
    let fx = Fixture::new();
    fx.install(None).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let running = Running::start(Arc::clone(&controller));

    settled_on(&mut rx, ViolationType::EmptyLicense).await;
    running.stop().await;
}

#[tokio::test]
async fn node_limit_tracks_node_churn() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1", "node-2", "node-3"], "1");
    fx.install(Some(encode(&fx.signed(license(3))))).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let running = Running::start(Arc::clone(&controller));

    // Exactly at the limit.
    settled_on(&mut rx, ViolationType::NoViolation).await;
    let status = fx.stored_status().await.unwrap();
    assert_eq!(status.usage.nodes, 3);
    assert_eq!(status.license_id.as_deref(), Some("44n6mnv6wqm17n"));

    // One over.
    fx.add_nodes(&["node-4"], "1");
    let snapshot = settled_on(&mut rx, ViolationType::NodeCountLimitExceeded).await;
    let violation = snapshot.last_status.unwrap().violation;
    assert_eq!(violation.limit, Some(3));
    assert_eq!(violation.observed, Some(4));
    assert_eq!(
        fx.stored_status().await.unwrap().violation_type(),
        ViolationType::NodeCountLimitExceeded
    );

    // Back at the limit.
    fx.store.remove_node("node-4").unwrap();
    settled_on(&mut rx, ViolationType::NoViolation).await;
    assert_eq!(
        fx.stored_status().await.unwrap().violation_type(),
        ViolationType::NoViolation
    );

    running.stop().await;
}

#[tokio::test]
async fn expired_license_masks_node_overuse() {
    let fx = Fixture::new();
    fx.add_nodes(&["a", "b", "c", "d", "e", "f"], "8");

    let mut doc = license(3);
    doc.not_before = doc.not_before - chrono::Duration::days(400);
    doc.not_after = crate::support::now() - chrono::Duration::days(1);
    fx.install(Some(encode(&fx.signed(doc)))).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let running = Running::start(Arc::clone(&controller));

    settled_on(&mut rx, ViolationType::Expired).await;
    running.stop().await;
}

#[tokio::test]
async fn altered_signature_reports_invalid_signature() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1"], "2");
    let doc = corrupt_signature(fx.signed(license(3)));
    fx.install(Some(encode(&doc))).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let running = Running::start(Arc::clone(&controller));

    let snapshot = settled_on(&mut rx, ViolationType::InvalidSignature).await;
    let status = snapshot.last_status.unwrap();
    assert_eq!(status.limits, None);
    assert!(status.violation.reason.is_some());

    running.stop().await;
}

#[tokio::test]
async fn garbage_bytes_report_invalid_signature() {
    let fx = Fixture::new();
    fx.install(Some(b"{not a license".to_vec())).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let running = Running::start(Arc::clone(&controller));

    settled_on(&mut rx, ViolationType::InvalidSignature).await;
    running.stop().await;
}

#[tokio::test]
async fn license_replacement_is_picked_up() {
    let fx = Fixture::new();
    fx.add_nodes(&["node-1", "node-2"], "4");
    fx.install(Some(Vec::new())).await;

    let controller = Arc::new(fx.controller());
    let mut rx = controller.subscribe();
    let running = Running::start(Arc::clone(&controller));

    settled_on(&mut rx, ViolationType::EmptyLicense).await;

    let mut doc = license(5);
    doc.max_core = 4;
    fx.replace_license(encode(&fx.signed(doc))).await;
    let snapshot = settled_on(&mut rx, ViolationType::CoreCountLimitExceeded).await;
    assert_eq!(snapshot.last_status.unwrap().usage.cores, 8);

    running.stop().await;
}
