//! Algorithm identifiers.

use serde::{Deserialize, Serialize};

/// Signature algorithm a trust anchor verifies with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureAlgorithm {
    /// ECDSA with NIST P-256 (secp256r1) over SHA-256.
    EcdsaP256 = 1,

    /// Ed25519 Edwards curve.
    Ed25519 = 2,

    /// RSASSA-PKCS1-v1_5 over SHA-256.
    RsaPkcs1Sha256 = 3,
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EcdsaP256 => write!(f, "ecdsa-p256"),
            Self::Ed25519 => write!(f, "ed25519"),
            Self::RsaPkcs1Sha256 => write!(f, "rsa-pkcs1-sha256"),
        }
    }
}
