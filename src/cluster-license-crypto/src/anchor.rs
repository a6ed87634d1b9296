//! The trust anchor: the only public key licenses are checked against.
//!
//! An anchor is loaded once during startup and then shared read-only. A
//! failure to load it is fatal for the caller; there is no fallback key.

use std::path::Path;

use ed25519_dalek::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};
use tracing::info;
use x509_cert::der::{Decode, Document, Encode};
use x509_cert::Certificate;

use crate::ecdsa::P256Verifier;
use crate::ed25519::Ed25519Verifier;
use crate::error::CryptoError;
use crate::rsa_pkcs1::{self, RsaVerifier};
use crate::types::SignatureAlgorithm;
use crate::verifier::SignatureVerifier;

/// Validated public key plus the algorithm it verifies with.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    algorithm: SignatureAlgorithm,
    /// SEC1 uncompressed point (P-256), raw 32 bytes (Ed25519) or DER
    /// SubjectPublicKeyInfo (RSA).
    public_key: Vec<u8>,
}

impl std::fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("algorithm", &self.algorithm)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl TrustAnchor {
    /// Build an anchor from an encoded public key.
    ///
    /// P-256 takes a SEC1 point, Ed25519 the raw 32 bytes, RSA a DER
    /// SubjectPublicKeyInfo.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid key for `algorithm`.
    pub fn from_public_key(
        algorithm: SignatureAlgorithm,
        public_key: &[u8],
    ) -> Result<Self, CryptoError> {
        match algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
                Ok(Self::p256(&vk))
            },
            SignatureAlgorithm::Ed25519 => {
                let bytes: [u8; 32] = public_key.try_into().map_err(|_| {
                    CryptoError::invalid_public_key(format!(
                        "Ed25519 public key must be 32 bytes, got {}",
                        public_key.len()
                    ))
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
                Ok(Self {
                    algorithm,
                    public_key: bytes.to_vec(),
                })
            },
            SignatureAlgorithm::RsaPkcs1Sha256 => {
                rsa_pkcs1::decode_public_key(public_key)?;
                Ok(Self {
                    algorithm,
                    public_key: public_key.to_vec(),
                })
            },
        }
    }

    /// Parse a PEM trust anchor.
    ///
    /// Accepts a `PUBLIC KEY` (SubjectPublicKeyInfo) or a `CERTIFICATE`, in
    /// which case the subject key is used. The certificate's own validity
    /// period and issuer chain are not checked. The algorithm is taken from
    /// the key itself.
    ///
    /// # Errors
    ///
    /// Returns error if the document holds no RSA, P-256 or Ed25519 key.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let (label, document) =
            Document::from_pem(pem.trim()).map_err(|e| CryptoError::UnsupportedAnchor {
                reason: format!("not a PEM document: {e}"),
            })?;

        match label {
            "PUBLIC KEY" => Self::from_spki_der(document.as_bytes()),
            "CERTIFICATE" => {
                let cert = Certificate::from_der(document.as_bytes()).map_err(|e| {
                    CryptoError::UnsupportedAnchor {
                        reason: format!("malformed certificate: {e}"),
                    }
                })?;
                let spki = cert
                    .tbs_certificate
                    .subject_public_key_info
                    .to_der()
                    .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
                Self::from_spki_der(&spki)
            },
            other => Err(CryptoError::UnsupportedAnchor {
                reason: format!("unexpected PEM label {other:?}"),
            }),
        }
    }

    fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(Self::p256(&vk));
        }

        if let Ok(vk) = ed25519_dalek::VerifyingKey::from_public_key_der(der) {
            return Ok(Self {
                algorithm: SignatureAlgorithm::Ed25519,
                public_key: vk.to_bytes().to_vec(),
            });
        }

        match rsa_pkcs1::decode_public_key(der) {
            Ok(_) => Ok(Self {
                algorithm: SignatureAlgorithm::RsaPkcs1Sha256,
                public_key: der.to_vec(),
            }),
            Err(e) => Err(CryptoError::UnsupportedAnchor {
                reason: format!("expected an RSA, P-256 or Ed25519 public key: {e}"),
            }),
        }
    }

    fn p256(vk: &p256::ecdsa::VerifyingKey) -> Self {
        Self {
            algorithm: SignatureAlgorithm::EcdsaP256,
            public_key: vk.to_encoded_point(false).as_bytes().to_vec(),
        }
    }

    /// Read and parse a PEM trust anchor from disk.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or does not hold a
    /// supported public key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|source| CryptoError::AnchorUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let anchor = Self::from_pem(&pem)?;
        info!(
            path = %path.display(),
            algorithm = %anchor.algorithm,
            fingerprint = %anchor.fingerprint(),
            "Loaded license trust anchor"
        );
        Ok(anchor)
    }

    /// Algorithm this anchor verifies with.
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Encoded public key bytes.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// `sha256:<hex>` over the encoded public key, for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.public_key);
        format!("sha256:{}", hex::encode(digest))
    }

    /// Verify `signature` over `data` with this anchor's key.
    ///
    /// # Errors
    ///
    /// Returns error if the signature is malformed for the algorithm.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        match self.algorithm {
            SignatureAlgorithm::EcdsaP256 => {
                P256Verifier::new().verify(&self.public_key, data, signature)
            },
            SignatureAlgorithm::Ed25519 => {
                Ed25519Verifier::new().verify(&self.public_key, data, signature)
            },
            SignatureAlgorithm::RsaPkcs1Sha256 => {
                RsaVerifier::new().verify(&self.public_key, data, signature)
            },
        }
    }
}
