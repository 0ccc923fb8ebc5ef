//! SHA-256 digests and base64 helpers.
//!
//! Descriptors and records carry hashes, signatures and public keys as
//! standard base64. Decoding tolerates embedded whitespace since values may be
//! wrapped when stored in XML or copied from text files.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// Compute the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of `data` and return it base64-encoded.
pub fn sha256_base64(data: &[u8]) -> String {
    encode_base64(&sha256(data))
}

/// Encode bytes as standard base64.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64, ignoring ASCII whitespace.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::InvalidInput(format!("invalid base64: {}", e)))
}

/// Strip whitespace from a base64 value so two encodings compare equal.
pub fn normalize_base64(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(digest[0], 0xba);
        assert_eq!(digest[31], 0xad);
        assert_eq!(sha256_base64(b"abc"), "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=");
    }

    #[test]
    fn test_decode_ignores_whitespace() {
        let wrapped = "ungWv48Bz+pBQUDeXa4i\nI7ADYaOWF3qctBD/\r\n YfIAFa0=";
        assert_eq!(decode_base64(wrapped).unwrap(), sha256(b"abc").to_vec());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_base64("not*base64"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_normalize_base64() {
        assert_eq!(normalize_base64(" QUJD\nREVG "), "QUJDREVG");
    }
}
