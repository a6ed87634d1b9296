//! Signature traits shared by the supported algorithms.

use crate::error::CryptoError;
#[cfg(feature = "signing")]
use crate::types::SignatureAlgorithm;

/// Trait for signature verification.
///
/// Returns `Ok(false)` for a well-formed signature that does not verify;
/// `Err` is reserved for malformed keys or signatures.
pub trait SignatureVerifier {
    /// Verify a signature against a public key.
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8])
        -> Result<bool, CryptoError>;
}

/// Trait for signing operations.
#[cfg(feature = "signing")]
pub trait Signer {
    /// Get the algorithm used by this signer.
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Get the encoded public key.
    fn public_key(&self) -> Result<Vec<u8>, CryptoError>;

    /// Sign data and return the signature.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
