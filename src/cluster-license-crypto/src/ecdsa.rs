//! ECDSA P-256 signature operations.
//!
//! Licenses signed with P-256 carry either the fixed-size `r || s` encoding
//! or an ASN.1 DER signature; both are accepted.

use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
#[cfg(feature = "signing")]
use p256::ecdsa::{signature::Signer as _, SigningKey};

use crate::error::CryptoError;
use crate::verifier::SignatureVerifier;
#[cfg(feature = "signing")]
use crate::{types::SignatureAlgorithm, verifier::Signer};

/// ECDSA P-256 signer.
#[cfg(feature = "signing")]
pub struct P256Signer {
    signing_key: SigningKey,
}

#[cfg(feature = "signing")]
impl P256Signer {
    /// Create a new signer with a random key.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand_core::OsRng),
        }
    }

    /// Create a signer from an existing key.
    ///
    /// # Errors
    ///
    /// Returns error if the key bytes are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// Get the verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// PEM-encoded SubjectPublicKeyInfo for the verifying key.
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be encoded.
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        use p256::pkcs8::{EncodePublicKey, LineEnding};

        self.signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))
    }

    /// Sign and return the DER encoding instead of `r || s`.
    ///
    /// # Errors
    ///
    /// Infallible in practice; kept fallible to match [`Signer::sign`].
    pub fn sign_der(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

#[cfg(feature = "signing")]
impl Signer for P256Signer {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::EcdsaP256
    }

    fn public_key(&self) -> Result<Vec<u8>, CryptoError> {
        let vk = self.signing_key.verifying_key();
        let encoded = vk.to_encoded_point(false); // Uncompressed
        Ok(encoded.as_bytes().to_vec())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(signature.to_bytes().to_vec())
    }
}

/// ECDSA P-256 verifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct P256Verifier;

impl P256Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for P256Verifier {
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        let vk = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;

        let sig = match Signature::from_slice(signature) {
            Ok(sig) => sig,
            Err(_) => Signature::from_der(signature)
                .map_err(|e| CryptoError::invalid_signature(e.to_string()))?,
        };

        match vk.verify(data, &sig) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}
