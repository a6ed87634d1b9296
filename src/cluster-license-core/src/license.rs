//! License document model and codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity record for the licensee or the issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Company.
    #[serde(default)]
    pub co: String,
    /// Contact or display name.
    #[serde(default)]
    pub name: String,
}

/// A signed license as stored under the record's data key.
///
/// Parsed fresh on every reconciliation pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseDocument {
    /// Unique license identifier.
    pub license_id: String,
    /// License type (e.g. `subscription`, `trial`).
    pub license_type: String,
    /// Document format version.
    pub version: i64,
    /// Licensee.
    pub subject: Party,
    /// Issuer.
    pub issuer: Party,
    /// Start of the validity window.
    pub not_before: DateTime<Utc>,
    /// End of the validity window (inclusive).
    pub not_after: DateTime<Utc>,
    /// Issue timestamp.
    pub issue_at: DateTime<Utc>,
    /// Maximum participating clusters.
    pub max_cluster: u64,
    /// Maximum nodes.
    pub max_node: u64,
    /// Maximum CPU cores across all nodes.
    pub max_core: u64,
    /// Base64 signature over the canonical form of every other field.
    pub signature: String,
}

/// Quantitative grants carried by a license. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseLimits {
    /// Maximum participating clusters.
    pub max_cluster: u64,
    /// Maximum nodes.
    pub max_node: u64,
    /// Maximum CPU cores.
    pub max_core: u64,
}

impl LicenseDocument {
    /// Quantitative limits of this license.
    #[must_use]
    pub fn limits(&self) -> LicenseLimits {
        LicenseLimits {
            max_cluster: self.max_cluster,
            max_node: self.max_node,
            max_core: self.max_core,
        }
    }

    /// Serialize to the JSON stored under the record's data key.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Outcome of decoding the raw record bytes when no document comes out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// No license data present. An expected state, not a failure.
    #[error("license data is empty")]
    Empty,
    /// Bytes present but not a license document.
    #[error("malformed license document: {reason}")]
    Malformed {
        /// Parser message.
        reason: String,
    },
}

/// Decode the bytes stored under the data key.
///
/// # Errors
///
/// [`CodecError::Empty`] when the key is absent or zero-length,
/// [`CodecError::Malformed`] when the bytes do not match the schema.
pub fn decode(raw: Option<&[u8]>) -> Result<LicenseDocument, CodecError> {
    let raw = match raw {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(CodecError::Empty),
    };

    serde_json::from_slice(raw).map_err(|e| CodecError::Malformed {
        reason: e.to_string(),
    })
}
