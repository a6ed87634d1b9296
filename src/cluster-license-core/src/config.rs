//! Configuration for the license controller.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Annotation the status is written under unless the store is told otherwise.
///
/// The key is owned by the [`crate::store::ResourceStore`]; the controller
/// reads it from there.
pub const DEFAULT_STATUS_ANNOTATION: &str = "license.cluster.io/status";

/// Configuration for the license controller.
///
/// The trust anchor is not part of this struct; it is loaded once and handed
/// to [`crate::signature::LicenseVerifier::new`].
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace of the license record.
    pub namespace: String,
    /// Name of the license record.
    pub record_name: String,
    /// Data key holding the raw license document.
    pub data_key: String,
    /// Retry policy for individual store calls failing transiently.
    pub store_retry: RetryPolicy,
    /// Passes attempted when the status write loses a version race.
    pub max_conflict_retries: u32,
    /// First requeue delay after a failed pass.
    pub requeue_base_delay: Duration,
    /// Cap on the requeue delay after repeated failures.
    pub requeue_max_delay: Duration,
    /// Upper bound between passes when nothing changes.
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: "license-system".into(),
            record_name: "cluster-license".into(),
            data_key: "license".into(),
            store_retry: RetryPolicy::default(),
            max_conflict_retries: 5,
            requeue_base_delay: Duration::from_millis(500),
            requeue_max_delay: Duration::from_secs(60),
            resync_interval: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}
