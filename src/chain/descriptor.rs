//! Signature descriptors and chain sequence checks.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// One signing event recorded in a document's chain.
///
/// Descriptors are immutable once embedded. `document_hash` covers the
/// normalized document as it was before this descriptor and its certificate
/// page were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureDescriptor {
    /// 1-based position in the chain
    pub order: u32,
    /// Logical document id shared by every descriptor in the chain
    pub document_id: String,
    /// Display name of the signer
    pub signer_name: String,
    /// Stable signer identifier; absent in chains written by older tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<String>,
    /// Signing time, millisecond precision
    pub signed_at: DateTime<Utc>,
    /// Signature algorithm, e.g. `ML-DSA-44`
    pub algorithm: String,
    /// Base64 SHA-256 of the signed normalized bytes
    pub document_hash: String,
    /// Base64 signature bytes
    pub signature_value: String,
    /// Base64 of the engine's public key material
    pub public_key: String,
}

impl SignatureDescriptor {
    /// Signing time as written into the chain packet.
    pub fn signed_at_text(&self) -> String {
        format_timestamp(&self.signed_at)
    }
}

/// Truncate a timestamp to the precision stored in the chain.
pub fn chain_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Format a timestamp as RFC 3339 with milliseconds and a `Z` suffix.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::ChainCorrupted(format!("invalid signing date '{}': {}", text, e)))
}

/// Check that `descriptors`, sorted ascending, are numbered exactly `1..=N`.
pub fn verify_sequence(descriptors: &[SignatureDescriptor]) -> Result<()> {
    for (index, descriptor) in descriptors.iter().enumerate() {
        let expected = index as u32 + 1;
        if descriptor.order != expected {
            return Err(Error::ChainCorrupted(format!(
                "expected signature order {}, found {}",
                expected, descriptor.order
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn descriptor(order: u32) -> SignatureDescriptor {
        SignatureDescriptor {
            order,
            document_id: "doc-1".to_string(),
            signer_name: "Alice".to_string(),
            signer_id: Some("alice".to_string()),
            signed_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            algorithm: "ML-DSA-44".to_string(),
            document_hash: "aGFzaA==".to_string(),
            signature_value: "c2ln".to_string(),
            public_key: "cGs=".to_string(),
        }
    }

    #[test]
    fn test_timestamp_millis_round_trip() {
        let at = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        let stored = chain_timestamp(at);
        let text = format_timestamp(&stored);
        assert_eq!(text, "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_timestamp(&text).unwrap(), stored);
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let parsed = parse_timestamp("2024-03-01T09:00:00-03:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(matches!(parse_timestamp("yesterday"), Err(Error::ChainCorrupted(_))));
    }

    #[test]
    fn test_verify_sequence() {
        assert!(verify_sequence(&[]).is_ok());
        assert!(verify_sequence(&[descriptor(1), descriptor(2), descriptor(3)]).is_ok());
        assert!(verify_sequence(&[descriptor(1), descriptor(3)]).is_err());
        assert!(verify_sequence(&[descriptor(1), descriptor(1)]).is_err());
        assert!(verify_sequence(&[descriptor(2)]).is_err());
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_string(&descriptor(1)).unwrap();
        assert!(json.contains("\"documentHash\""));
        assert!(json.contains("\"signerId\""));
        let back: SignatureDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor(1));
    }
}
