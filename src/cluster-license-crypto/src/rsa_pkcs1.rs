//! RSASSA-PKCS1-v1_5 with SHA-256.
//!
//! Public keys are carried as DER SubjectPublicKeyInfo, the form a
//! certificate anchor yields. Signatures are the raw big-endian integer,
//! exactly as long as the modulus.

use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::verifier::SignatureVerifier;

/// Parse a DER SubjectPublicKeyInfo holding an RSA key.
pub(crate) fn decode_public_key(spki_der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| CryptoError::invalid_public_key(format!("RSA: {e}")))
}

/// RSA PKCS#1 v1.5 / SHA-256 verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaVerifier;

impl RsaVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for RsaVerifier {
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let key = decode_public_key(public_key)?;

        if signature.len() != key.size() {
            return Err(CryptoError::invalid_signature(format!(
                "RSA signature must be {} bytes, got {}",
                key.size(),
                signature.len()
            )));
        }

        let signature = Signature::try_from(signature)
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        Ok(VerifyingKey::<Sha256>::new(key)
            .verify(data, &signature)
            .is_ok())
    }
}
