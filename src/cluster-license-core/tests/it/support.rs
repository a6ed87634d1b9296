//! Shared fixtures: signed licenses, a seeded store, and settle helpers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::watch;

use cluster_license_core::canonical::canonical_bytes;
use cluster_license_core::store::WatchStream;
use cluster_license_core::{
    ControllerConfig, ControllerPhase, ControllerSnapshot, InMemoryStore, LicenseController,
    LicenseDocument, LicenseRecord, LicenseStatus, LicenseVerifier, NodeRecord, ObjectKey, Party,
    ResourceStore, StaticMembership, StatusAnnotation, StoreError, ViolationType,
    DEFAULT_STATUS_ANNOTATION,
};
use cluster_license_crypto::{Ed25519Signer, Signer, TrustAnchor};

pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn config() -> ControllerConfig {
    ControllerConfig::default()
}

pub fn record_key() -> ObjectKey {
    let config = config();
    ObjectKey::new(config.namespace, config.record_name)
}

pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Unsigned license valid from a day ago until a year from now.
pub fn license(max_node: u64) -> LicenseDocument {
    let now = now();
    LicenseDocument {
        license_id: "44n6mnv6wqm17n".into(),
        license_type: "subscription".into(),
        version: 1,
        subject: Party {
            co: String::new(),
            name: "lihui".into(),
        },
        issuer: Party {
            co: "qingcloud".into(),
            name: "qingcloud".into(),
        },
        not_before: now - chrono::Duration::days(1),
        not_after: now + chrono::Duration::days(365),
        issue_at: now - chrono::Duration::days(2),
        max_cluster: 1,
        max_node,
        max_core: 64,
        signature: String::new(),
    }
}

pub fn sign(signer: &impl Signer, mut doc: LicenseDocument) -> LicenseDocument {
    let signature = signer.sign(&canonical_bytes(&doc).unwrap()).unwrap();
    doc.signature = STANDARD.encode(signature);
    doc
}

pub fn encode(doc: &LicenseDocument) -> Vec<u8> {
    doc.to_json().unwrap()
}

/// Flip one byte of the decoded signature.
pub fn corrupt_signature(mut doc: LicenseDocument) -> LicenseDocument {
    let mut raw = STANDARD.decode(&doc.signature).unwrap();
    raw[0] ^= 0x01;
    doc.signature = STANDARD.encode(raw);
    doc
}

pub fn verifier_for(signer: &impl Signer) -> LicenseVerifier {
    let anchor =
        TrustAnchor::from_public_key(signer.algorithm(), &signer.public_key().unwrap()).unwrap();
    LicenseVerifier::new(anchor)
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub signer: Ed25519Signer,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new(DEFAULT_STATUS_ANNOTATION)),
            signer: Ed25519Signer::random(),
        }
    }

    pub fn controller(&self) -> LicenseController {
        self.controller_on(Arc::clone(&self.store) as Arc<dyn ResourceStore>)
    }

    pub fn controller_on(&self, store: Arc<dyn ResourceStore>) -> LicenseController {
        self.controller_with(config(), store)
    }

    pub fn controller_with(
        &self,
        config: ControllerConfig,
        store: Arc<dyn ResourceStore>,
    ) -> LicenseController {
        LicenseController::new(
            config,
            store,
            Arc::new(StaticMembership::standalone()),
            verifier_for(&self.signer),
        )
    }

    pub fn signed(&self, doc: LicenseDocument) -> LicenseDocument {
        sign(&self.signer, doc)
    }

    pub fn add_nodes(&self, names: &[&str], cpu: &str) {
        for name in names {
            self.store.upsert_node(NodeRecord::new(*name, cpu)).unwrap();
        }
    }

    /// Create the license record holding `data` (no data key when `None`).
    pub async fn install(&self, data: Option<Vec<u8>>) -> LicenseRecord {
        let key = record_key();
        let mut record = LicenseRecord::new(key.namespace, key.name);
        if let Some(bytes) = data {
            record = record.with_data(config().data_key, bytes);
        }
        self.store.create_license(record).await.unwrap()
    }

    /// Replace the license data, keeping everything else.
    pub async fn replace_license(&self, data: Vec<u8>) -> LicenseRecord {
        let current = self.store.get_license(&record_key()).await.unwrap().unwrap();
        let updated = current.with_data(config().data_key, data);
        self.store.update_license(updated).await.unwrap()
    }

    /// Status as a consumer would read it off the record.
    pub async fn stored_status(&self) -> Option<LicenseStatus> {
        let record = self.store.get_license(&record_key()).await.unwrap()?;
        let value = record.annotations.get(DEFAULT_STATUS_ANNOTATION)?;
        Some(StatusAnnotation::parse(value).unwrap())
    }
}

/// Forwards to an in-memory store, injecting failures.
pub struct FaultyStore {
    pub inner: Arc<InMemoryStore>,
    /// Status writes that lose a race against a concurrent record update.
    conflicts: AtomicU32,
    /// `list_nodes` calls that fail as if the API server were down.
    outages: AtomicU32,
    pub write_attempts: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(0),
            outages: AtomicU32::new(0),
            write_attempts: AtomicU32::new(0),
        }
    }

    pub fn with_conflicts(self, n: u32) -> Self {
        self.conflicts.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_outages(self, n: u32) -> Self {
        self.outages.store(n, Ordering::SeqCst);
        self
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ResourceStore for FaultyStore {
    async fn get_license(&self, key: &ObjectKey) -> Result<Option<LicenseRecord>, StoreError> {
        self.inner.get_license(key).await
    }

    async fn create_license(&self, record: LicenseRecord) -> Result<LicenseRecord, StoreError> {
        self.inner.create_license(record).await
    }

    async fn update_license(&self, record: LicenseRecord) -> Result<LicenseRecord, StoreError> {
        self.inner.update_license(record).await
    }

    async fn delete_license(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.inner.delete_license(key).await
    }

    async fn write_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: &StatusAnnotation,
    ) -> Result<LicenseRecord, StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.conflicts) {
            // Someone else touches the record between our read and our write.
            if let Some(current) = self.inner.get_license(key).await? {
                self.inner.update_license(current).await?;
            }
        }
        self.inner.write_status(key, resource_version, status).await
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        if Self::take(&self.outages) {
            return Err(StoreError::unavailable("connection refused"));
        }
        self.inner.list_nodes().await
    }

    fn watch_licenses(&self, namespace: &str) -> WatchStream<LicenseRecord> {
        self.inner.watch_licenses(namespace)
    }

    fn watch_nodes(&self) -> WatchStream<NodeRecord> {
        self.inner.watch_nodes()
    }

    fn status_annotation_key(&self) -> &str {
        self.inner.status_annotation_key()
    }
}

/// Wait until the controller has settled on `expected`.
pub async fn settled_on(
    rx: &mut watch::Receiver<ControllerSnapshot>,
    expected: ViolationType,
) -> ControllerSnapshot {
    let snapshot = tokio::time::timeout(
        SETTLE_TIMEOUT,
        rx.wait_for(|s| {
            s.phase == ControllerPhase::Settled
                && s.last_status.as_ref().map(LicenseStatus::violation_type) == Some(expected)
        }),
    )
    .await
    .unwrap_or_else(|_| panic!("controller did not settle on {expected}"))
    .expect("controller dropped");
    snapshot.clone()
}
