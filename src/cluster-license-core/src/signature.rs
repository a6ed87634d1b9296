//! License signature verification against the trust anchor.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use cluster_license_crypto::{CryptoError, TrustAnchor};
use thiserror::Error;

use crate::canonical::canonical_bytes;
use crate::license::LicenseDocument;

/// Why a license signature was rejected.
#[derive(Debug, Error)]
pub enum SignatureFailure {
    /// The `signature` field is not base64.
    #[error("signature is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// The canonical form could not be produced.
    #[error("canonical form unavailable: {0}")]
    Canonical(#[from] serde_json::Error),

    /// The decoded signature has the wrong shape for the anchor's algorithm.
    #[error("{0}")]
    Malformed(#[from] CryptoError),

    /// Well-formed signature that does not match the anchor.
    #[error("signature does not match the trust anchor")]
    Mismatch,
}

/// Verifies license signatures against one shared trust anchor.
///
/// Cheap to clone; the anchor is read-only for the life of the process.
#[derive(Debug, Clone)]
pub struct LicenseVerifier {
    anchor: Arc<TrustAnchor>,
}

impl LicenseVerifier {
    /// Create a verifier for the given anchor.
    #[must_use]
    pub fn new(anchor: TrustAnchor) -> Self {
        Self {
            anchor: Arc::new(anchor),
        }
    }

    /// The anchor licenses are checked against.
    #[must_use]
    pub fn anchor(&self) -> &TrustAnchor {
        &self.anchor
    }

    /// Check the signature and report why it was rejected.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason when the signature does not verify.
    pub fn check(&self, doc: &LicenseDocument) -> Result<(), SignatureFailure> {
        let signature = STANDARD.decode(doc.signature.trim())?;
        let message = canonical_bytes(doc)?;

        if self.anchor.verify(&message, &signature)? {
            Ok(())
        } else {
            Err(SignatureFailure::Mismatch)
        }
    }
}
