//! Kubernetes backend: Secrets hold licenses, Nodes are the inventory.

use std::collections::BTreeMap;
use std::future::ready;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use kube_runtime::{watcher, WatchStreamExt};
use serde_json::json;
use tracing::{debug, instrument};

use super::{LicenseRecord, NodeRecord, ObjectKey, ResourceStore, WatchEvent, WatchStream};
use crate::error::StoreError;
use crate::types::StatusAnnotation;

const FIELD_MANAGER: &str = "license-controller";

/// [`ResourceStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    status_key: String,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("status_key", &self.status_key)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Create a store writing status under `status_key`.
    #[must_use]
    pub fn new(client: Client, status_key: impl Into<String>) -> Self {
        Self {
            client,
            status_key: status_key.into(),
        }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_err(kind: &'static str, name: String, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound { kind, name },
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists { kind, name }
        },
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict {
            name,
            expected: resp.message,
        },
        other => StoreError::unavailable(other.to_string()),
    }
}

fn secret_to_record(secret: Secret) -> Result<LicenseRecord, StoreError> {
    let meta = secret.metadata;
    let name = meta
        .name
        .ok_or_else(|| StoreError::invalid("secret without a name"))?;
    let namespace = meta
        .namespace
        .ok_or_else(|| StoreError::invalid(format!("secret {name} without a namespace")))?;

    Ok(LicenseRecord {
        namespace,
        name,
        resource_version: meta.resource_version.unwrap_or_default(),
        data: secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, v.0))
            .collect(),
        annotations: meta.annotations.unwrap_or_default(),
    })
}

fn record_to_secret(record: LicenseRecord) -> Secret {
    let resource_version = Some(record.resource_version).filter(|v| !v.is_empty());
    Secret {
        metadata: ObjectMeta {
            name: Some(record.name),
            namespace: Some(record.namespace),
            resource_version,
            annotations: Some(record.annotations),
            ..ObjectMeta::default()
        },
        data: Some(
            record
                .data
                .into_iter()
                .map(|(k, v)| (k, ByteString(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Secret::default()
    }
}

fn node_to_record(node: Node) -> NodeRecord {
    let cpu_capacity = node
        .status
        .and_then(|s| s.capacity)
        .and_then(|c| c.get("cpu").map(|q| q.0.clone()));
    NodeRecord {
        name: node.metadata.name.unwrap_or_default(),
        cpu_capacity,
    }
}

fn convert_event<K, T>(
    event: watcher::Event<K>,
    convert: impl Fn(K) -> Result<T, StoreError>,
) -> Option<Result<WatchEvent<T>, StoreError>> {
    use watcher::Event::{Apply, Delete, Init, InitApply, InitDone};

    let (wrap, object): (fn(T) -> WatchEvent<T>, K) = match event {
        InitApply(o) => (WatchEvent::Created, o),
        Apply(o) => (WatchEvent::Updated, o),
        Delete(o) => (WatchEvent::Deleted, o),
        Init | InitDone => return None,
    };
    Some(convert(object).map(wrap))
}

#[async_trait]
impl ResourceStore for KubeStore {
    #[instrument(skip(self), fields(license = %key))]
    async fn get_license(&self, key: &ObjectKey) -> Result<Option<LicenseRecord>, StoreError> {
        self.secrets(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| map_err("secret", key.to_string(), e))?
            .map(secret_to_record)
            .transpose()
    }

    async fn create_license(&self, mut record: LicenseRecord) -> Result<LicenseRecord, StoreError> {
        let key = record.key();
        record.annotations.remove(&self.status_key);
        record.resource_version.clear();

        let created = self
            .secrets(&key.namespace)
            .create(&PostParams::default(), &record_to_secret(record))
            .await
            .map_err(|e| map_err("secret", key.to_string(), e))?;
        secret_to_record(created)
    }

    async fn update_license(&self, mut record: LicenseRecord) -> Result<LicenseRecord, StoreError> {
        let key = record.key();
        let current = self
            .get_license(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "secret",
                name: key.to_string(),
            })?;

        // Keep the controller's status; a stale version is rejected by the server.
        match current.annotations.get(&self.status_key).cloned() {
            Some(status) => record.annotations.insert(self.status_key.clone(), status),
            None => record.annotations.remove(&self.status_key),
        };

        let replaced = self
            .secrets(&key.namespace)
            .replace(&key.name, &PostParams::default(), &record_to_secret(record))
            .await
            .map_err(|e| map_err("secret", key.to_string(), e))?;
        secret_to_record(replaced)
    }

    async fn delete_license(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.secrets(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_err("secret", key.to_string(), e))
    }

    #[instrument(skip(self, status), fields(license = %key))]
    async fn write_status(
        &self,
        key: &ObjectKey,
        resource_version: &str,
        status: &StatusAnnotation,
    ) -> Result<LicenseRecord, StoreError> {
        let patch = json!({
            "metadata": {
                "resourceVersion": resource_version,
                "annotations": { self.status_key.as_str(): status.as_str() },
            }
        });

        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_owned()),
            ..PatchParams::default()
        };
        let patched = self
            .secrets(&key.namespace)
            .patch(&key.name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| map_err("secret", key.to_string(), e))?;
        debug!("Status annotation patched");
        secret_to_record(patched)
    }

    #[instrument(skip(self))]
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let nodes = Api::<Node>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|e| map_err("node", "*".into(), e))?;
        Ok(nodes.items.into_iter().map(node_to_record).collect())
    }

    fn watch_licenses(&self, namespace: &str) -> WatchStream<LicenseRecord> {
        watcher(self.secrets(namespace), watcher::Config::default())
            .default_backoff()
            .filter_map(|item| {
                ready(match item {
                    Ok(event) => convert_event(event, secret_to_record),
                    Err(e) => Some(Err(StoreError::unavailable(e.to_string()))),
                })
            })
            .boxed()
    }

    fn watch_nodes(&self) -> WatchStream<NodeRecord> {
        watcher(Api::<Node>::all(self.client.clone()), watcher::Config::default())
            .default_backoff()
            .filter_map(|item| {
                ready(match item {
                    Ok(event) => convert_event(event, |node| Ok(node_to_record(node))),
                    Err(e) => Some(Err(StoreError::unavailable(e.to_string()))),
                })
            })
            .boxed()
    }

    fn status_annotation_key(&self) -> &str {
        &self.status_key
    }
}
