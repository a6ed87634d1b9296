//! License status: the verdict published on the license record.

use serde::{Deserialize, Serialize};

use crate::census::ClusterCensus;
use crate::license::LicenseLimits;

/// Violation classes, in precedence order.
///
/// When several apply, the earliest listed wins. The serialized names are
/// the wire contract read by downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationType {
    /// No license data present.
    EmptyLicense,
    /// Malformed document or signature not matching the trust anchor.
    InvalidSignature,
    /// Past `notAfter`.
    Expired,
    /// Before `notBefore`.
    NotYetValid,
    /// More clusters than `maxCluster`.
    ClusterCountLimitExceeded,
    /// More nodes than `maxNode`.
    NodeCountLimitExceeded,
    /// More CPU cores than `maxCore`.
    CoreCountLimitExceeded,
    /// Valid license within all limits.
    NoViolation,
}

impl ViolationType {
    /// All types in precedence order.
    pub const ALL: [Self; 8] = [
        Self::EmptyLicense,
        Self::InvalidSignature,
        Self::Expired,
        Self::NotYetValid,
        Self::ClusterCountLimitExceeded,
        Self::NodeCountLimitExceeded,
        Self::CoreCountLimitExceeded,
        Self::NoViolation,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyLicense => "EmptyLicense",
            Self::InvalidSignature => "InvalidSignature",
            Self::Expired => "Expired",
            Self::NotYetValid => "NotYetValid",
            Self::ClusterCountLimitExceeded => "ClusterCountLimitExceeded",
            Self::NodeCountLimitExceeded => "NodeCountLimitExceeded",
            Self::CoreCountLimitExceeded => "CoreCountLimitExceeded",
            Self::NoViolation => "NoViolation",
        }
    }

    /// Anything other than [`ViolationType::NoViolation`].
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        !matches!(self, Self::NoViolation)
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single violation reported for a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation class.
    #[serde(rename = "type")]
    pub kind: ViolationType,
    /// Licensed bound, for limit violations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Observed value, for limit violations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<u64>,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Violation {
    /// A violation with no detail.
    #[must_use]
    pub fn new(kind: ViolationType) -> Self {
        Self {
            kind,
            limit: None,
            observed: None,
            reason: None,
        }
    }

    /// The `NoViolation` verdict.
    #[must_use]
    pub fn none() -> Self {
        Self::new(ViolationType::NoViolation)
    }

    /// A limit violation carrying both sides of the comparison.
    #[must_use]
    pub fn exceeded(kind: ViolationType, limit: u64, observed: u64) -> Self {
        Self {
            limit: Some(limit),
            observed: Some(observed),
            ..Self::new(kind)
        }
    }

    /// Attach a reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Status published under the reserved annotation key.
///
/// Contains no timestamps, so equal inputs always encode to equal bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatus {
    /// The verdict.
    pub violation: Violation,
    /// License the verdict refers to, when one could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_id: Option<String>,
    /// Usage the limits were compared against.
    #[serde(default)]
    pub usage: ClusterCensus,
    /// Limits of a verified license.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LicenseLimits>,
}

impl LicenseStatus {
    /// Shorthand for `self.violation.kind`.
    #[must_use]
    pub fn violation_type(&self) -> ViolationType {
        self.violation.kind
    }
}

/// Encoded status annotation value.
///
/// Only this crate can construct one, so the reserved key is only ever
/// written with a status the evaluator produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAnnotation(String);

impl StatusAnnotation {
    pub(crate) fn encode(status: &LicenseStatus) -> Result<Self, serde_json::Error> {
        serde_json::to_string(status).map(Self)
    }

    /// Parse an annotation value read back from a record.
    ///
    /// # Errors
    ///
    /// Returns error if the value is not a license status.
    pub fn parse(value: &str) -> Result<LicenseStatus, serde_json::Error> {
        serde_json::from_str(value)
    }

    /// The encoded value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
