//! Persistence of signature records.
//!
//! One [`SignatureRecord`] is stored per signing event. Writes are staged with
//! [`SignatureRepository::add_document`] and become visible only after
//! [`SignatureRepository::save_changes`]; [`SignatureRepository::discard_changes`]
//! drops whatever is staged. This is the transaction boundary the signing
//! workflow relies on to leave nothing behind on failure.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileRepository;
pub use memory::InMemoryRepository;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stored data about one signing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    /// Unique record id
    pub id: String,
    /// Logical document id shared with the chain descriptors
    pub document_id: String,
    /// Position of this signature in the chain
    pub order: u32,
    /// Name of the document as submitted
    pub document_name: String,
    /// Storage path of the normalized bytes that were signed
    pub original_path: String,
    /// Base64 SHA-256 of the bytes at `original_path`
    pub original_hash: String,
    /// Storage path of the signed document
    pub signed_path: String,
    /// Signer identifier
    pub signer_id: String,
    /// Signer display name
    pub signer_name: String,
    /// Signature algorithm
    pub algorithm: String,
    /// Base64 signature bytes
    pub signature_value: String,
    /// Base64 public key material
    pub public_key: String,
    /// Signing time
    pub signed_at: DateTime<Utc>,
    /// Size in bytes of the signed document
    pub size: u64,
}

impl SignatureRecord {
    /// Check that required fields are present.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("id", &self.id),
            ("document id", &self.document_id),
            ("document name", &self.document_name),
            ("original path", &self.original_path),
            ("original hash", &self.original_hash),
            ("signer id", &self.signer_id),
            ("signer name", &self.signer_name),
            ("algorithm", &self.algorithm),
            ("signature value", &self.signature_value),
            ("public key", &self.public_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("signature record has an empty {}", name)));
            }
        }
        if self.order == 0 {
            return Err(Error::InvalidInput("signature order starts at 1".to_string()));
        }
        Ok(())
    }
}

/// Repository of signature records.
pub trait SignatureRepository: Send + Sync {
    /// Stage a record. Rejects a second record for the same document and order.
    fn add_document(&self, record: SignatureRecord) -> Result<()>;

    /// Committed records of a document, ascending by order.
    fn get_by_document_id(&self, document_id: &str) -> Result<Vec<SignatureRecord>>;

    /// Committed record for one signature of a document.
    fn find_signature(&self, document_id: &str, order: u32) -> Result<Option<SignatureRecord>>;

    /// Committed record of `signer_id` signed closest to `at`, within `tolerance`.
    fn get_by_signer_and_time_window(
        &self,
        signer_id: &str,
        at: DateTime<Utc>,
        tolerance: Duration,
    ) -> Result<Option<SignatureRecord>>;

    /// Commit staged records.
    fn save_changes(&self) -> Result<()>;

    /// Drop staged records.
    fn discard_changes(&self) -> Result<()>;
}

/// Records of `document_id`, ascending by order.
pub(crate) fn select_document(records: &[SignatureRecord], document_id: &str) -> Vec<SignatureRecord> {
    let mut selected: Vec<SignatureRecord> = records
        .iter()
        .filter(|r| r.document_id == document_id)
        .cloned()
        .collect();
    selected.sort_by_key(|r| r.order);
    selected
}

pub(crate) fn select_signature(records: &[SignatureRecord], document_id: &str, order: u32) -> Option<SignatureRecord> {
    records
        .iter()
        .find(|r| r.document_id == document_id && r.order == order)
        .cloned()
}

pub(crate) fn select_time_window(
    records: &[SignatureRecord],
    signer_id: &str,
    at: DateTime<Utc>,
    tolerance: Duration,
) -> Option<SignatureRecord> {
    let tolerance_ms = tolerance.as_millis() as i64;
    records
        .iter()
        .filter(|r| r.signer_id == signer_id)
        .map(|r| (r, (r.signed_at - at).num_milliseconds().abs()))
        .filter(|(_, distance)| *distance <= tolerance_ms)
        .min_by_key(|(_, distance)| *distance)
        .map(|(r, _)| r.clone())
}

pub(crate) fn check_duplicate(existing: &[SignatureRecord], record: &SignatureRecord) -> Result<()> {
    if existing
        .iter()
        .any(|r| r.id == record.id || (r.document_id == record.document_id && r.order == record.order))
    {
        return Err(Error::InvalidInput(format!(
            "a record for document {} signature {} already exists",
            record.document_id, record.order
        )));
    }
    Ok(())
}

pub(crate) fn poisoned<T>(_: T) -> Error {
    Error::Storage("repository lock poisoned".to_string())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::SignatureRecord;
    use chrono::{TimeZone, Utc};

    pub fn record(document_id: &str, order: u32, second: u32) -> SignatureRecord {
        SignatureRecord {
            id: format!("{}-{}", document_id, order),
            document_id: document_id.to_string(),
            order,
            document_name: "contract.pdf".to_string(),
            original_path: format!("alice/2024-01-01/{}-{}.pdf", document_id, order),
            original_hash: "aGFzaA==".to_string(),
            signed_path: format!("alice/2024-01-01/{}-{}-signed.pdf", document_id, order),
            signer_id: "alice".to_string(),
            signer_name: "Alice".to_string(),
            algorithm: "ML-DSA-44".to_string(),
            signature_value: "c2ln".to_string(),
            public_key: "cGs=".to_string(),
            signed_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, second).unwrap(),
            size: 1024,
        }
    }
}
