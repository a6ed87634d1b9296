//! Cluster resource census: what the license limits are compared against.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::store::NodeRecord;

const NANOS_PER_UNIT: u128 = 1_000_000_000;
const NANOS_PER_MILLI: u128 = 1_000_000;

/// Observed usage at one instant. All counts are non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCensus {
    /// Participating clusters.
    pub clusters: u64,
    /// Distinct nodes.
    pub nodes: u64,
    /// CPU cores summed over nodes, each node rounded up to whole cores.
    pub cores: u64,
}

impl ClusterCensus {
    /// Build a census from a node listing.
    ///
    /// Nodes are counted once per name. A node whose CPU capacity is missing
    /// or unparseable contributes zero cores.
    #[must_use]
    pub fn from_nodes(nodes: &[NodeRecord], clusters: u64) -> Self {
        let unique: BTreeMap<&str, &NodeRecord> =
            nodes.iter().map(|n| (n.name.as_str(), n)).collect();

        let cores = unique
            .values()
            .map(|node| node_cores(node))
            .fold(0u64, u64::saturating_add);

        Self {
            clusters,
            nodes: unique.len() as u64,
            cores,
        }
    }
}

fn node_cores(node: &NodeRecord) -> u64 {
    let Some(quantity) = node.cpu_capacity.as_deref() else {
        warn!(node = %node.name, "Node reports no CPU capacity; counting 0 cores");
        return 0;
    };

    match parse_cpu_millis(quantity) {
        Some(millis) => millis.div_ceil(1000),
        None => {
            warn!(node = %node.name, quantity, "Unparseable CPU capacity; counting 0 cores");
            0
        },
    }
}

/// Parse a CPU quantity (`"4"`, `"3500m"`, `"1.5"`, `"2k"`) into millicores,
/// rounding any sub-millicore remainder up.
///
/// Decimal suffixes `n u m k M G T P E` and binary suffixes `Ki`..`Ei` are
/// accepted. Negative values and exponent notation are not.
#[must_use]
pub fn parse_cpu_millis(quantity: &str) -> Option<u64> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: u128 = {
        // Nine digits of precision; anything finer is below a nanocore.
        let mut digits: String = fraction.chars().take(9).collect();
        while digits.len() < 9 {
            digits.push('0');
        }
        digits.parse().ok()?
    };
    let nanos = whole.checked_mul(NANOS_PER_UNIT)?.checked_add(fraction)?;

    let (multiplier, divisor): (u128, u128) = match suffix {
        "n" => (1, 1_000_000_000),
        "u" => (1, 1_000_000),
        "m" => (1, 1_000),
        "" => (1, 1),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => return None,
    };

    let scaled = nanos.checked_mul(multiplier)?;
    let millis = scaled.div_ceil(divisor * NANOS_PER_MILLI);
    u64::try_from(millis).ok()
}

/// Source of the participating cluster count.
///
/// A standalone installation is one cluster; a federation host reports its
/// member clusters.
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    /// Number of clusters currently covered by the license.
    async fn cluster_count(&self) -> Result<u64, StoreError>;
}

/// Fixed cluster count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMembership(u64);

impl StaticMembership {
    /// A fixed number of clusters.
    #[must_use]
    pub fn new(clusters: u64) -> Self {
        Self(clusters)
    }

    /// A single standalone cluster.
    #[must_use]
    pub fn standalone() -> Self {
        Self(1)
    }
}

#[async_trait]
impl ClusterMembership for StaticMembership {
    async fn cluster_count(&self) -> Result<u64, StoreError> {
        Ok(self.0)
    }
}
