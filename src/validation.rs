//! Validation of a document's signature chain.
//!
//! Signatures are checked newest first. Each one must have a stored record,
//! consistent hashes, and a signature the engine accepts; the layer is then
//! peeled off and the next older signature is checked against what remains.
//! The first failure stops the walk, and older signatures are reported as
//! [`CheckOutcome::NotEvaluated`].
//!
//! Signature-level problems are reported, not raised. Only infrastructure
//! failures (storage, repository, engine) surface as errors.

use crate::chain::{verify_sequence, SignatureDescriptor};
use crate::compose::{DocumentComposer, PdfComposer};
use crate::config::DEFAULT_RECORD_TOLERANCE;
use crate::digest::{decode_base64, encode_base64, normalize_base64, sha256, sha256_base64};
use crate::engine::SignatureEngine;
use crate::error::{Error, Result};
use crate::repository::{SignatureRecord, SignatureRepository};
use crate::storage::FileStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Overall validation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// Every signature in the chain is valid
    Valid,
    /// At least one signature failed, or there are none
    Invalid,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Valid => f.write_str("VALID"),
            ValidationStatus::Invalid => f.write_str("INVALID"),
        }
    }
}

/// Why a signature failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidReason {
    /// No stored record matches the descriptor
    RecordNotFound,
    /// Stored bytes, record and descriptor disagree on the signed content
    HashMismatch { detail: String },
    /// The engine rejected the signature
    CryptographicMismatch,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::RecordNotFound => f.write_str("record not found"),
            InvalidReason::HashMismatch { detail } => write!(f, "hash mismatch ({})", detail),
            InvalidReason::CryptographicMismatch => f.write_str("cryptographic mismatch"),
        }
    }
}

/// Result of checking one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckOutcome {
    Valid,
    Invalid(InvalidReason),
    /// Not checked because a newer signature failed first
    NotEvaluated,
}

impl CheckOutcome {
    /// Whether the signature was checked and found valid.
    pub fn is_valid(&self) -> bool {
        matches!(self, CheckOutcome::Valid)
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Valid => f.write_str("valid"),
            CheckOutcome::Invalid(reason) => write!(f, "invalid: {}", reason),
            CheckOutcome::NotEvaluated => f.write_str("not evaluated"),
        }
    }
}

/// Per-signature entry of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureCheck {
    pub order: u32,
    pub signer_name: String,
    pub signer_id: Option<String>,
    pub document_id: String,
    pub algorithm: String,
    pub signed_at: DateTime<Utc>,
    pub outcome: CheckOutcome,
}

impl SignatureCheck {
    fn new(descriptor: &SignatureDescriptor, outcome: CheckOutcome) -> Self {
        Self {
            order: descriptor.order,
            signer_name: descriptor.signer_name.clone(),
            signer_id: descriptor.signer_id.clone(),
            document_id: descriptor.document_id.clone(),
            algorithm: descriptor.algorithm.clone(),
            signed_at: descriptor.signed_at,
            outcome,
        }
    }
}

/// Outcome of validating a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Overall status
    pub status: ValidationStatus,
    /// Human-readable summary
    pub message: String,
    /// Number of signatures in the chain
    pub total_signatures: usize,
    /// One entry per signature, oldest first
    pub signatures: Vec<SignatureCheck>,
}

impl ValidationReport {
    fn invalid(message: impl Into<String>, signatures: Vec<SignatureCheck>) -> Self {
        Self {
            status: ValidationStatus::Invalid,
            message: message.into(),
            total_signatures: signatures.len(),
            signatures,
        }
    }

    /// Whether the whole chain is valid.
    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }
}

/// Validates signature chains against stored records and the engine.
pub struct ValidationEngine<C: DocumentComposer = PdfComposer> {
    engine: Arc<dyn SignatureEngine>,
    repository: Arc<dyn SignatureRepository>,
    storage: Arc<dyn FileStorage>,
    composer: C,
    tolerance: Duration,
}

impl ValidationEngine<PdfComposer> {
    /// Create a validator with the default composer.
    pub fn new(
        engine: Arc<dyn SignatureEngine>,
        repository: Arc<dyn SignatureRepository>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            engine,
            repository,
            storage,
            composer: PdfComposer::new(),
            tolerance: DEFAULT_RECORD_TOLERANCE,
        }
    }
}

impl<C: DocumentComposer> ValidationEngine<C> {
    /// Time window used when a record is looked up by signer and time.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Replace the document composer.
    pub fn with_composer<D: DocumentComposer>(self, composer: D) -> ValidationEngine<D> {
        ValidationEngine {
            engine: self.engine,
            repository: self.repository,
            storage: self.storage,
            composer,
            tolerance: self.tolerance,
        }
    }

    /// Validate every signature of `pdf`.
    pub fn validate(&self, pdf: &[u8]) -> Result<ValidationReport> {
        let chain = match self.composer.extract_chain(pdf) {
            Ok(chain) => chain,
            Err(Error::ChainCorrupted(reason)) => {
                log::warn!("Unreadable signature chain: {}", reason);
                return Ok(ValidationReport::invalid(format!("signature chain corrupted: {}", reason), Vec::new()));
            },
            Err(e) => return Err(e),
        };

        if chain.is_empty() {
            return Ok(ValidationReport::invalid("no signatures found", Vec::new()));
        }

        if let Err(Error::ChainCorrupted(reason)) = verify_sequence(&chain) {
            log::warn!("Signature chain sequence broken: {}", reason);
            let checks = chain
                .iter()
                .map(|d| SignatureCheck::new(d, CheckOutcome::NotEvaluated))
                .collect();
            return Ok(ValidationReport::invalid(format!("signature chain corrupted: {}", reason), checks));
        }

        let mut outcomes: Vec<CheckOutcome> = vec![CheckOutcome::NotEvaluated; chain.len()];
        let mut working = pdf.to_vec();
        let mut failure: Option<(u32, InvalidReason)> = None;

        for (index, descriptor) in chain.iter().enumerate().rev() {
            match self.check_signature(descriptor, &working)? {
                Ok(peeled) => {
                    log::debug!("Signature {} is valid", descriptor.order);
                    outcomes[index] = CheckOutcome::Valid;
                    working = peeled;
                },
                Err(reason) => {
                    log::info!("Signature {} is invalid: {}", descriptor.order, reason);
                    outcomes[index] = CheckOutcome::Invalid(reason.clone());
                    failure = Some((descriptor.order, reason));
                    break;
                },
            }
        }

        let checks: Vec<SignatureCheck> = chain
            .iter()
            .zip(outcomes)
            .map(|(d, outcome)| SignatureCheck::new(d, outcome))
            .collect();

        Ok(match failure {
            None => ValidationReport {
                status: ValidationStatus::Valid,
                message: format!("all {} signature(s) are valid", checks.len()),
                total_signatures: checks.len(),
                signatures: checks,
            },
            Some((order, reason)) => ValidationReport::invalid(format!("signature {}: {}", order, reason), checks),
        })
    }

    /// Check one signature against the current working document.
    ///
    /// The outer `Result` carries infrastructure errors; the inner one is the
    /// verdict, with the peeled document on success.
    fn check_signature(
        &self,
        descriptor: &SignatureDescriptor,
        working: &[u8],
    ) -> Result<std::result::Result<Vec<u8>, InvalidReason>> {
        let record = match self.find_record(descriptor)? {
            Some(record) => record,
            None => return Ok(Err(InvalidReason::RecordNotFound)),
        };

        if !self.storage.exists(&record.original_path)? {
            log::warn!(
                "Stored original {} for signature {} is missing",
                record.original_path,
                descriptor.order
            );
            return Ok(Err(mismatch("stored original is missing")));
        }
        let original = self.storage.read(&record.original_path)?;
        let digest = sha256(&original);
        let original_hash = encode_base64(&digest);
        let claimed = normalize_base64(&descriptor.document_hash);

        if original_hash != normalize_base64(&record.original_hash) {
            return Ok(Err(mismatch("stored original does not match its record")));
        }
        if original_hash != claimed {
            return Ok(Err(mismatch("stored original does not match the chain entry")));
        }

        let peeled = match self.composer.peel(working, descriptor.order) {
            Ok(peeled) => peeled,
            Err(e @ (Error::MalformedDocument(_) | Error::ChainCorrupted(_) | Error::InvalidInput(_))) => {
                return Ok(Err(mismatch(&format!("signature layer cannot be removed: {}", e))));
            },
            Err(e) => return Err(e),
        };
        if sha256_base64(&peeled) != claimed {
            return Ok(Err(mismatch("document content differs from what was signed")));
        }

        let (signature, public_key) = match (
            decode_base64(&descriptor.signature_value),
            decode_base64(&descriptor.public_key),
        ) {
            (Ok(signature), Ok(public_key)) => (signature, public_key),
            _ => return Ok(Err(InvalidReason::CryptographicMismatch)),
        };

        if !self.engine.verify(&digest, &signature, &public_key)? {
            return Ok(Err(InvalidReason::CryptographicMismatch));
        }

        Ok(Ok(peeled))
    }

    fn find_record(&self, descriptor: &SignatureDescriptor) -> Result<Option<SignatureRecord>> {
        if let Some(record) = self
            .repository
            .find_signature(&descriptor.document_id, descriptor.order)?
        {
            return Ok(Some(record));
        }

        match &descriptor.signer_id {
            Some(signer_id) => {
                log::debug!(
                    "No record for document {} signature {}, searching by signer {}",
                    descriptor.document_id,
                    descriptor.order,
                    signer_id
                );
                self.repository
                    .get_by_signer_and_time_window(signer_id, descriptor.signed_at, self.tolerance)
            },
            None => Ok(None),
        }
    }
}

fn mismatch(detail: &str) -> InvalidReason {
    InvalidReason::HashMismatch {
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_messages() {
        assert_eq!(InvalidReason::RecordNotFound.to_string(), "record not found");
        assert_eq!(InvalidReason::CryptographicMismatch.to_string(), "cryptographic mismatch");
        assert!(mismatch("x").to_string().starts_with("hash mismatch"));
    }

    #[test]
    fn test_report_json_shape() {
        let report = ValidationReport::invalid("no signatures found", Vec::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "invalid");
        assert_eq!(json["totalSignatures"], 0);
        assert!(!report.is_valid());
        assert_eq!(report.status.to_string(), "INVALID");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(CheckOutcome::NotEvaluated.to_string(), "not evaluated");
        assert_eq!(
            CheckOutcome::Invalid(InvalidReason::RecordNotFound).to_string(),
            "invalid: record not found"
        );
        assert!(CheckOutcome::Valid.is_valid());
    }
}
