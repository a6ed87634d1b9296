//! Resource store abstraction.
//!
//! The controller reads the license record and the node list, writes the
//! status annotation, and watches both for changes. Everything else about
//! the backing system stays behind [`ResourceStore`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;
use crate::types::StatusAnnotation;

mod memory;
#[cfg(feature = "kubernetes")]
mod kube;

pub use memory::InMemoryStore;
#[cfg(feature = "kubernetes")]
pub use self::kube::KubeStore;

/// Namespaced object identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
}

impl ObjectKey {
    /// Create a key.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The record holding the license document and its status annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseRecord {
    /// Namespace.
    pub namespace: String,
    /// Name.
    pub name: String,
    /// Opaque version token, assigned by the store on every write.
    pub resource_version: String,
    /// Data entries; the license lives under the configured data key.
    pub data: BTreeMap<String, Vec<u8>>,
    /// Annotations; the status lives under the reserved annotation key.
    pub annotations: BTreeMap<String, String>,
}

impl LicenseRecord {
    /// An empty record.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set a data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Identity of this record.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

/// A cluster node as far as licensing cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Node name.
    pub name: String,
    /// CPU capacity quantity, e.g. `"4"` or `"3500m"`.
    pub cpu_capacity: Option<String>,
}

impl NodeRecord {
    /// Create a node record.
    #[must_use]
    pub fn new(name: impl Into<String>, cpu_capacity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpu_capacity: Some(cpu_capacity.into()),
        }
    }
}

/// Change notification from a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    /// Object appeared (or was listed when the watch started).
    Created(T),
    /// Object changed.
    Updated(T),
    /// Object disappeared; carries its last known state.
    Deleted(T),
}

impl<T> WatchEvent<T> {
    /// The object the event is about.
    pub fn object(&self) -> &T {
        match self {
            Self::Created(o) | Self::Updated(o) | Self::Deleted(o) => o,
        }
    }
}

/// Stream of watch events. An `Err` item reports a broken watch; the stream
/// may continue afterwards.
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>, StoreError>>;

/// Backing store for license records and node inventory.
///
/// Writes are optimistic: every mutating call carries the version the
/// caller read and fails with [`StoreError::Conflict`] if it is stale.
/// `create_license` and `update_license` never touch the reserved status
/// annotation; [`ResourceStore::write_status`] is its only writer.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read a license record; `Ok(None)` if it does not exist.
    async fn get_license(&self, key: &ObjectKey) -> Result<Option<LicenseRecord>, StoreError>;

    /// Create a license record and return it with its assigned version.
    async fn create_license(&self, record: LicenseRecord) -> Result<LicenseRecord, StoreError>;

    /// Replace a license record's data and annotations.
    async fn update_license(&self, record: LicenseRecord) -> Result<LicenseRecord, StoreError>;

    /// Delete a license record.
    async fn delete_license(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Set the reserved status annotation, conditional on `resource_version`.
    async fn write_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: &StatusAnnotation,
    ) -> Result<LicenseRecord, StoreError>;

    /// List every node.
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError>;

    /// Watch license records in `namespace`.
    fn watch_licenses(&self, namespace: &str) -> WatchStream<LicenseRecord>;

    /// Watch nodes.
    fn watch_nodes(&self) -> WatchStream<NodeRecord>;

    /// The reserved annotation key this store writes status under.
    fn status_annotation_key(&self) -> &str;
}
