//! In-process store, used by tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::future::ready;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::{LicenseRecord, NodeRecord, ObjectKey, ResourceStore, WatchEvent, WatchStream};
use crate::error::StoreError;
use crate::types::StatusAnnotation;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
enum StoreEvent {
    License(WatchEvent<LicenseRecord>),
    Node(WatchEvent<NodeRecord>),
}

#[derive(Default)]
struct State {
    version: u64,
    licenses: HashMap<ObjectKey, LicenseRecord>,
    nodes: BTreeMap<String, NodeRecord>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// [`ResourceStore`] held entirely in memory.
///
/// Versions come from one monotonic counter. Watches only see events that
/// happen after they were opened.
pub struct InMemoryStore {
    status_key: String,
    state: Mutex<State>,
    events: broadcast::Sender<StoreEvent>,
    status_writes: AtomicU64,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("status_key", &self.status_key)
            .field("status_writes", &self.status_writes())
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// Create an empty store reserving `status_key` for status writes.
    #[must_use]
    pub fn new(status_key: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            status_key: status_key.into(),
            state: Mutex::new(State::default()),
            events,
            status_writes: AtomicU64::new(0),
        }
    }

    /// Number of successful [`ResourceStore::write_status`] calls.
    #[must_use]
    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Add or replace a node.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn upsert_node(&self, node: NodeRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let event = match state.nodes.insert(node.name.clone(), node.clone()) {
            Some(_) => WatchEvent::Updated(node),
            None => WatchEvent::Created(node),
        };
        drop(state);
        self.publish(StoreEvent::Node(event));
        Ok(())
    }

    /// Remove a node; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns error if the store lock is poisoned.
    pub fn remove_node(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.lock()?.nodes.remove(name);
        match removed {
            Some(node) => {
                self.publish(StoreEvent::Node(WatchEvent::Deleted(node)));
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::unavailable("in-memory store lock poisoned"))
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(event);
    }

    fn not_found(key: &ObjectKey) -> StoreError {
        StoreError::NotFound {
            kind: "license",
            name: key.to_string(),
        }
    }

    fn check_version(current: &LicenseRecord, expected: &str) -> Result<(), StoreError> {
        if current.resource_version == expected {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                name: current.key().to_string(),
                expected: expected.to_owned(),
            })
        }
    }

    fn lagged(watch: &str, err: BroadcastStreamRecvError) -> StoreError {
        StoreError::unavailable(format!("{watch} watch interrupted: {err}"))
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_license(&self, key: &ObjectKey) -> Result<Option<LicenseRecord>, StoreError> {
        Ok(self.lock()?.licenses.get(key).cloned())
    }

    async fn create_license(&self, mut record: LicenseRecord) -> Result<LicenseRecord, StoreError> {
        let key = record.key();
        let mut state = self.lock()?;
        if state.licenses.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "license",
                name: key.to_string(),
            });
        }

        record.annotations.remove(&self.status_key);
        record.resource_version = state.next_version();
        state.licenses.insert(key, record.clone());
        drop(state);

        self.publish(StoreEvent::License(WatchEvent::Created(record.clone())));
        Ok(record)
    }

    async fn update_license(&self, mut record: LicenseRecord) -> Result<LicenseRecord, StoreError> {
        let key = record.key();
        let mut state = self.lock()?;
        let current = state.licenses.get(&key).ok_or_else(|| Self::not_found(&key))?;
        Self::check_version(current, &record.resource_version)?;

        // Status is owned by write_status; keep whatever it last wrote.
        match current.annotations.get(&self.status_key).cloned() {
            Some(status) => record.annotations.insert(self.status_key.clone(), status),
            None => record.annotations.remove(&self.status_key),
        };
        record.resource_version = state.next_version();
        state.licenses.insert(key, record.clone());
        drop(state);

        self.publish(StoreEvent::License(WatchEvent::Updated(record.clone())));
        Ok(record)
    }

    async fn delete_license(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let removed = self.lock()?.licenses.remove(key);
        let record = removed.ok_or_else(|| Self::not_found(key))?;
        self.publish(StoreEvent::License(WatchEvent::Deleted(record)));
        Ok(())
    }

    async fn write_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: &StatusAnnotation,
    ) -> Result<LicenseRecord, StoreError> {
        let mut state = self.lock()?;
        let current = state.licenses.get(key).ok_or_else(|| Self::not_found(key))?;
        Self::check_version(current, resource_version)?;

        let version = state.next_version();
        let record = state.licenses.get_mut(key).ok_or_else(|| Self::not_found(key))?;
        record
            .annotations
            .insert(self.status_key.clone(), status.as_str().to_owned());
        record.resource_version = version;
        let record = record.clone();
        drop(state);

        self.status_writes.fetch_add(1, Ordering::SeqCst);
        debug!(record = %key, version = %record.resource_version, "Status annotation written");
        self.publish(StoreEvent::License(WatchEvent::Updated(record.clone())));
        Ok(record)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        Ok(self.lock()?.nodes.values().cloned().collect())
    }

    fn watch_licenses(&self, namespace: &str) -> WatchStream<LicenseRecord> {
        let namespace = namespace.to_owned();
        BroadcastStream::new(self.events.subscribe())
            .filter_map(move |item| {
                ready(match item {
                    Ok(StoreEvent::License(event)) if event.object().namespace == namespace => {
                        Some(Ok(event))
                    },
                    Ok(_) => None,
                    Err(e) => Some(Err(Self::lagged("license", e))),
                })
            })
            .boxed()
    }

    fn watch_nodes(&self) -> WatchStream<NodeRecord> {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|item| {
                ready(match item {
                    Ok(StoreEvent::Node(event)) => Some(Ok(event)),
                    Ok(StoreEvent::License(_)) => None,
                    Err(e) => Some(Err(Self::lagged("node", e))),
                })
            })
            .boxed()
    }

    fn status_annotation_key(&self) -> &str {
        &self.status_key
    }
}
