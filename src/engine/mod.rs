//! External post-quantum signing engine.
//!
//! The ML-DSA work is delegated to an engine behind [`SignatureEngine`].
//! [`NativeEngine`] drives a command-line executable; tests and embedders may
//! provide their own implementation.
//!
//! A signature that fails to verify is `Ok(false)`, never an error. Errors are
//! reserved for an engine that cannot be reached
//! ([`Error::EngineUnavailable`](crate::error::Error::EngineUnavailable)) or
//! that misbehaves ([`Error::EngineProtocolError`](crate::error::Error::EngineProtocolError)).

pub mod artifact;
pub mod native;

pub use native::NativeEngine;

use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref ALGORITHM_RE: Regex = Regex::new(r"ML-DSA-(44|65|87)").expect("valid regex");
}

/// Algorithms the engine is expected to support.
pub const SUPPORTED_ALGORITHMS: [&str; 3] = ["ML-DSA-44", "ML-DSA-65", "ML-DSA-87"];

/// Result of a signing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSignature {
    /// Raw signature bytes
    pub signature: Vec<u8>,
    /// Algorithm reported by the engine
    pub algorithm: String,
}

/// Key material exactly as produced by the engine (usually PEM text).
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Public key bytes
    pub public_key: Vec<u8>,
    /// Private key bytes
    pub private_key: Vec<u8>,
}

impl KeyPair {
    /// Create a key pair from raw material.
    pub fn new(public_key: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// Algorithm named in the public key material, if any.
    pub fn algorithm(&self) -> Option<String> {
        detect_algorithm(&self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &format_args!("<{} bytes>", self.public_key.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Signing engine contract.
pub trait SignatureEngine: Send + Sync {
    /// Sign `data` with `private_key`.
    fn sign(&self, data: &[u8], private_key: &[u8]) -> Result<EngineSignature>;

    /// Verify `signature` over `data`. A mismatch is `Ok(false)`.
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool>;

    /// Generate a key pair for `algorithm`.
    fn generate_key_pair(&self, algorithm: &str) -> Result<KeyPair>;
}

/// Find an `ML-DSA-44/65/87` algorithm name in engine output or key material.
pub fn detect_algorithm(text: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(text);
    ALGORITHM_RE.find(&text).map(|m| m.as_str().to_string())
}

/// Check that `algorithm` is one of [`SUPPORTED_ALGORITHMS`].
pub fn is_supported_algorithm(algorithm: &str) -> bool {
    SUPPORTED_ALGORITHMS.contains(&algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_algorithm() {
        let pem = b"-----BEGIN ML-DSA-65 PUBLIC KEY-----\nAAAA\n-----END ML-DSA-65 PUBLIC KEY-----\n";
        assert_eq!(detect_algorithm(pem), Some("ML-DSA-65".to_string()));
        assert_eq!(detect_algorithm(b"Signed using ML-DSA-87 in 3ms"), Some("ML-DSA-87".to_string()));
        assert_eq!(detect_algorithm(b"ML-DSA-99"), None);
        assert_eq!(detect_algorithm(b""), None);
    }

    #[test]
    fn test_supported_algorithms() {
        assert!(is_supported_algorithm("ML-DSA-44"));
        assert!(!is_supported_algorithm("Ed25519"));
    }

    #[test]
    fn test_key_pair_debug_redacts_private_key() {
        let keys = KeyPair::new(b"public".to_vec(), b"very secret".to_vec());
        let debug = format!("{:?}", keys);
        assert!(debug.contains("redacted"));
        assert!(!debug.contains("very secret"));
    }
}
