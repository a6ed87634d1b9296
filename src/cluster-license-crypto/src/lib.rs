//! # cluster-license-crypto
//!
//! Signature primitives for verifying cluster license documents.
//!
//! A license is trusted when its detached signature verifies against the
//! [`TrustAnchor`], the public key the operator installs alongside the
//! controller, either as a bare public key or inside an X.509 certificate.
//! Three algorithms are accepted:
//!
//! - **RSA** PKCS#1 v1.5 with SHA-256
//! - **ECDSA P-256** with SHA-256 (fixed-size `r || s` or DER signatures)
//! - **Ed25519**
//!
//! The anchor holds public material only. Signing helpers are compiled in
//! with the `signing` feature so tests and fixture tooling can mint
//! licenses; the controller itself never signs.
//!
//! ```rust,ignore
//! let anchor = TrustAnchor::load("/etc/license/trust-anchor.pem")?;
//! let valid = anchor.verify(&canonical_bytes, &signature)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod anchor;
mod ecdsa;
mod ed25519;
mod error;
mod rsa_pkcs1;
mod types;
mod verifier;

pub use anchor::TrustAnchor;
pub use ecdsa::P256Verifier;
pub use ed25519::Ed25519Verifier;
pub use error::CryptoError;
pub use rsa_pkcs1::RsaVerifier;
pub use types::SignatureAlgorithm;
pub use verifier::SignatureVerifier;

#[cfg(feature = "signing")]
pub use ecdsa::P256Signer;
#[cfg(feature = "signing")]
pub use ed25519::Ed25519Signer;
#[cfg(feature = "signing")]
pub use verifier::Signer;
