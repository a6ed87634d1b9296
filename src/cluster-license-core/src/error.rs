//! Error types for store access and reconciliation.
//!
//! Only infrastructure problems are errors here. A missing, malformed, forged
//! or expired license is a verdict and lives in [`crate::types`].

use thiserror::Error;

/// Errors reported by a [`crate::store::ResourceStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed object does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Object kind.
        kind: &'static str,
        /// `namespace/name` of the object.
        name: String,
    },

    /// An object with the same identity already exists.
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Object kind.
        kind: &'static str,
        /// `namespace/name` of the object.
        name: String,
    },

    /// Optimistic concurrency check failed: the object changed since it was read.
    #[error("Conflicting write to {name}: version {expected} is stale")]
    Conflict {
        /// `namespace/name` of the object.
        name: String,
        /// Version the writer based its update on.
        expected: String,
    },

    /// The backend could not be reached or answered with a server-side failure.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// The backend returned an object the controller cannot interpret.
    #[error("Invalid object: {message}")]
    Invalid {
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an invalid object error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Worth retrying the same call after a delay.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Lost an optimistic concurrency race.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors surfaced by the license controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Store access failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The computed status could not be serialized.
    #[error("Failed to encode license status: {0}")]
    StatusEncoding(#[from] serde_json::Error),

    /// Every status write attempt lost the optimistic concurrency race.
    #[error("Status write still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted {
        /// Number of passes attempted.
        attempts: u32,
    },
}
