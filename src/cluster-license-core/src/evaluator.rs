//! Violation evaluation.
//!
//! [`evaluate`] is a pure function of its inputs: the same integrity,
//! temporal verdict and census always yield the same violation. Checks run
//! in precedence order and the first one that fires wins.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::census::ClusterCensus;
use crate::license::{self, CodecError, LicenseLimits};
use crate::signature::LicenseVerifier;
use crate::temporal::{self, TemporalVerdict};
use crate::types::{LicenseStatus, Violation, ViolationType};

/// Outcome of decoding and authenticating the raw license bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    /// No license data.
    Empty,
    /// Data present but not a license document.
    Malformed {
        /// Parser message.
        reason: String,
    },
    /// Parsed, but the signature does not match the trust anchor.
    InvalidSignature {
        /// Rejection reason.
        reason: String,
    },
    /// Parsed and authenticated.
    Verified(LicenseLimits),
}

/// Everything a verdict depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Decoding and signature outcome.
    pub integrity: Integrity,
    /// Validity window outcome; [`TemporalVerdict::Unchecked`] unless verified.
    pub temporal: TemporalVerdict,
    /// Observed usage.
    pub census: ClusterCensus,
}

type Check = fn(&Evaluation) -> Option<Violation>;

const CHECKS: [Check; 7] = [
    check_empty,
    check_signature,
    check_expired,
    check_not_yet_valid,
    check_clusters,
    check_nodes,
    check_cores,
];

fn check_empty(e: &Evaluation) -> Option<Violation> {
    matches!(e.integrity, Integrity::Empty).then(|| Violation::new(ViolationType::EmptyLicense))
}

fn check_signature(e: &Evaluation) -> Option<Violation> {
    match &e.integrity {
        Integrity::Malformed { reason } | Integrity::InvalidSignature { reason } => Some(
            Violation::new(ViolationType::InvalidSignature).with_reason(reason.clone()),
        ),
        Integrity::Empty | Integrity::Verified(_) => None,
    }
}

fn check_expired(e: &Evaluation) -> Option<Violation> {
    (e.temporal == TemporalVerdict::Expired).then(|| Violation::new(ViolationType::Expired))
}

fn check_not_yet_valid(e: &Evaluation) -> Option<Violation> {
    (e.temporal == TemporalVerdict::NotYetValid).then(|| Violation::new(ViolationType::NotYetValid))
}

fn limits(e: &Evaluation) -> Option<&LicenseLimits> {
    match &e.integrity {
        Integrity::Verified(limits) => Some(limits),
        _ => None,
    }
}

fn exceeded(kind: ViolationType, limit: u64, observed: u64) -> Option<Violation> {
    (observed > limit).then(|| Violation::exceeded(kind, limit, observed))
}

fn check_clusters(e: &Evaluation) -> Option<Violation> {
    let limits = limits(e)?;
    exceeded(ViolationType::ClusterCountLimitExceeded, limits.max_cluster, e.census.clusters)
}

fn check_nodes(e: &Evaluation) -> Option<Violation> {
    let limits = limits(e)?;
    exceeded(ViolationType::NodeCountLimitExceeded, limits.max_node, e.census.nodes)
}

fn check_cores(e: &Evaluation) -> Option<Violation> {
    let limits = limits(e)?;
    exceeded(ViolationType::CoreCountLimitExceeded, limits.max_core, e.census.cores)
}

/// Select the single highest-precedence violation.
#[must_use]
pub fn evaluate(evaluation: &Evaluation) -> Violation {
    CHECKS
        .iter()
        .find_map(|check| check(evaluation))
        .unwrap_or_else(Violation::none)
}

/// Result of one full assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Status to publish.
    pub status: LicenseStatus,
    /// Next instant the verdict may change with no input changing.
    pub next_transition: Option<DateTime<Utc>>,
}

/// Decode, authenticate and evaluate the raw license bytes.
#[must_use]
pub fn assess(
    raw: Option<&[u8]>,
    verifier: &LicenseVerifier,
    census: ClusterCensus,
    now: DateTime<Utc>,
) -> Assessment {
    let mut license_id = None;
    let mut next_transition = None;
    let mut verified_limits = None;

    let (integrity, temporal) = match license::decode(raw) {
        Err(CodecError::Empty) => (Integrity::Empty, TemporalVerdict::Unchecked),
        Err(CodecError::Malformed { reason }) => {
            (Integrity::Malformed { reason }, TemporalVerdict::Unchecked)
        },
        Ok(doc) => {
            license_id = Some(doc.license_id.clone());
            match verifier.check(&doc) {
                Ok(()) => {
                    let limits = doc.limits();
                    verified_limits = Some(limits);
                    next_transition = temporal::next_boundary(&doc, now);
                    (Integrity::Verified(limits), temporal::check(&doc, now))
                },
                Err(e) => {
                    debug!(license_id = %doc.license_id, error = %e, "License signature rejected");
                    (
                        Integrity::InvalidSignature {
                            reason: e.to_string(),
                        },
                        TemporalVerdict::Unchecked,
                    )
                },
            }
        },
    };

    let violation = evaluate(&Evaluation {
        integrity,
        temporal,
        census,
    });

    Assessment {
        status: LicenseStatus {
            violation,
            license_id,
            usage: census,
            limits: verified_limits,
        },
        next_transition,
    }
}
