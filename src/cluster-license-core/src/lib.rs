//! # cluster-license-core
//!
//! License enforcement for a cluster: decides whether the installed license
//! is authentic, currently valid, and covers the resources the cluster
//! actually runs, then publishes that verdict on the license record.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     LicenseController                        │
//! │                                                              │
//! │   watch(license) ──┐                      ┌── watch(nodes)   │
//! │                    ▼                      ▼                  │
//! │              ┌──────────────────────────────────┐            │
//! │              │   WorkQueue (one key, deduped)   │            │
//! │              └──────────────────────────────────┘            │
//! │                               │                              │
//! │                               ▼                              │
//! │   decode ─▶ verify signature ─▶ validity window ─▶ census    │
//! │                               │                              │
//! │                               ▼                              │
//! │              ┌──────────────────────────────────┐            │
//! │              │   evaluate (ordered checks)      │            │
//! │              └──────────────────────────────────┘            │
//! │                               │                              │
//! │                               ▼                              │
//! │          write status annotation if it changed               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Properties
//!
//! - **Fail-closed**: an unreadable or forged license is reported as
//!   `InvalidSignature`, never trusted
//! - **One verdict**: exactly one violation type per pass, by fixed precedence
//! - **Idempotent**: unchanged inputs produce no write
//! - **Single writer**: only the controller can produce a status annotation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod canonical;
pub mod census;
pub mod config;
pub mod controller;
pub mod error;
pub mod evaluator;
pub mod license;
pub mod queue;
pub mod retry;
pub mod signature;
pub mod store;
pub mod temporal;
pub mod types;

pub use census::{ClusterCensus, ClusterMembership, StaticMembership};
pub use config::{ControllerConfig, DEFAULT_STATUS_ANNOTATION};
pub use controller::{
    Clock, ControllerPhase, ControllerSnapshot, LicenseController, ReconcileOutcome,
    Reconciliation, SystemClock,
};
pub use error::{ControllerError, StoreError};
pub use evaluator::{assess, evaluate, Assessment, Evaluation, Integrity};
pub use license::{CodecError, LicenseDocument, LicenseLimits, Party};
pub use retry::RetryPolicy;
pub use signature::{LicenseVerifier, SignatureFailure};
pub use store::{InMemoryStore, LicenseRecord, NodeRecord, ObjectKey, ResourceStore, WatchEvent};
pub use temporal::TemporalVerdict;
pub use types::{LicenseStatus, StatusAnnotation, Violation, ViolationType};

#[cfg(feature = "kubernetes")]
pub use store::KubeStore;
