//! Signing workflow.
//!
//! [`SigningOrchestrator::sign`] runs the stages
//! `Normalizing → Hashing → Signing → ComposingMetadata → Merging →
//! Persisting → Done`. Nothing is persisted before `Persisting`; a failure
//! there deletes the files already stored and discards staged records.

use crate::chain::{chain_timestamp, verify_sequence, SignatureDescriptor};
use crate::compose::{CertificatePageRenderer, DocumentComposer, PdfComposer, SummaryPageRenderer};
use crate::digest::{encode_base64, sha256};
use crate::engine::{KeyPair, SignatureEngine};
use crate::error::{Error, Result};
use crate::repository::{SignatureRecord, SignatureRepository};
use crate::storage::{FileStorage, CONTENT_TYPE_PDF};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Who is signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerIdentity {
    /// Stable identifier, also the storage owner
    pub id: String,
    /// Display name written into the chain and certificate page
    pub name: String,
}

impl SignerIdentity {
    /// Create an identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Input of one signing event.
#[derive(Debug)]
pub struct SignRequest<'a> {
    /// Name of the submitted document
    pub document_name: String,
    /// PDF bytes, signed or not
    pub content: Vec<u8>,
    /// Signer
    pub signer: SignerIdentity,
    /// Signer's key pair
    pub keys: &'a KeyPair,
}

/// Output of a successful signing event.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    /// Persisted record
    pub record: SignatureRecord,
    /// Descriptor embedded in the chain
    pub descriptor: SignatureDescriptor,
    /// Signed PDF bytes
    pub content: Vec<u8>,
}

/// Stages of the signing workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStage {
    Normalizing,
    Hashing,
    Signing,
    ComposingMetadata,
    Merging,
    Persisting,
    Done,
}

impl fmt::Display for SigningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SigningStage::Normalizing => "normalizing",
            SigningStage::Hashing => "hashing",
            SigningStage::Signing => "signing",
            SigningStage::ComposingMetadata => "composing metadata",
            SigningStage::Merging => "merging",
            SigningStage::Persisting => "persisting",
            SigningStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Adds a signature layer to a document and persists the result.
pub struct SigningOrchestrator<C: DocumentComposer = PdfComposer> {
    engine: Arc<dyn SignatureEngine>,
    repository: Arc<dyn SignatureRepository>,
    storage: Arc<dyn FileStorage>,
    composer: C,
    renderer: Box<dyn SummaryPageRenderer>,
}

impl SigningOrchestrator<PdfComposer> {
    /// Create an orchestrator with the default composer and certificate page.
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
            renderer: Box::new(CertificatePageRenderer::new()),
        }
    }
}

impl<C: DocumentComposer> SigningOrchestrator<C> {
    /// Replace the certificate page renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn SummaryPageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the document composer.
    pub fn with_composer<D: DocumentComposer>(self, composer: D) -> SigningOrchestrator<D> {
        SigningOrchestrator {
            engine: self.engine,
            repository: self.repository,
            storage: self.storage,
            composer,
            renderer: self.renderer,
        }
    }

    /// Sign a document.
    pub fn sign(&self, request: SignRequest<'_>) -> Result<SignedDocument> {
        validate_request(&request)?;
        let document_name = request.document_name.as_str();

        enter(SigningStage::Normalizing, document_name);
        let normalized = self
            .composer
            .normalize(&request.content)
            .map_err(|e| failed(SigningStage::Normalizing, e))?;
        let existing = self
            .composer
            .extract_chain(&normalized)
            .and_then(|chain| verify_sequence(&chain).map(|_| chain))
            .map_err(|e| failed(SigningStage::Normalizing, e))?;

        enter(SigningStage::Hashing, document_name);
        let digest = sha256(&normalized);
        let document_hash = encode_base64(&digest);

        enter(SigningStage::Signing, document_name);
        let signature = self
            .engine
            .sign(&digest, &request.keys.private_key)
            .map_err(|e| failed(SigningStage::Signing, e))?;

        let document_id = existing
            .first()
            .map(|d| d.document_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let descriptor = SignatureDescriptor {
            order: existing.len() as u32 + 1,
            document_id,
            signer_name: request.signer.name.clone(),
            signer_id: Some(request.signer.id.clone()),
            signed_at: chain_timestamp(Utc::now()),
            algorithm: signature.algorithm.clone(),
            document_hash: document_hash.clone(),
            signature_value: encode_base64(&signature.signature),
            public_key: encode_base64(&request.keys.public_key),
        };

        enter(SigningStage::ComposingMetadata, document_name);
        let page = self
            .renderer
            .render(&descriptor, document_name)
            .map_err(|e| failed(SigningStage::ComposingMetadata, e))?;

        enter(SigningStage::Merging, document_name);
        let signed = self
            .composer
            .compose(&normalized, &page, &descriptor)
            .map_err(|e| failed(SigningStage::Merging, e))?;

        enter(SigningStage::Persisting, document_name);
        let record = self
            .persist(&request, &descriptor, &normalized, &document_hash, &signed)
            .map_err(|e| failed(SigningStage::Persisting, e))?;

        enter(SigningStage::Done, document_name);
        log::info!(
            "Signed {} as signature {} of document {} ({})",
            document_name,
            descriptor.order,
            descriptor.document_id,
            descriptor.algorithm
        );

        Ok(SignedDocument {
            record,
            descriptor,
            content: signed,
        })
    }

    fn persist(
        &self,
        request: &SignRequest<'_>,
        descriptor: &SignatureDescriptor,
        normalized: &[u8],
        original_hash: &str,
        signed: &[u8],
    ) -> Result<SignatureRecord> {
        let mut stored: Vec<String> = Vec::new();
        let result = self.store(request, descriptor, normalized, original_hash, signed, &mut stored);
        if result.is_err() {
            self.roll_back(&stored);
        }
        result
    }

    fn store(
        &self,
        request: &SignRequest<'_>,
        descriptor: &SignatureDescriptor,
        normalized: &[u8],
        original_hash: &str,
        signed: &[u8],
        stored: &mut Vec<String>,
    ) -> Result<SignatureRecord> {
        let owner = request.signer.id.as_str();

        let original_path = self
            .storage
            .save(normalized, &request.document_name, CONTENT_TYPE_PDF, owner)?;
        stored.push(original_path.clone());

        let signed_name = format!("signed_{}", request.document_name);
        let signed_path = self.storage.save(signed, &signed_name, CONTENT_TYPE_PDF, owner)?;
        stored.push(signed_path.clone());

        let record = SignatureRecord {
            id: Uuid::new_v4().to_string(),
            document_id: descriptor.document_id.clone(),
            order: descriptor.order,
            document_name: request.document_name.clone(),
            original_path,
            original_hash: original_hash.to_string(),
            signed_path,
            signer_id: request.signer.id.clone(),
            signer_name: request.signer.name.clone(),
            algorithm: descriptor.algorithm.clone(),
            signature_value: descriptor.signature_value.clone(),
            public_key: descriptor.public_key.clone(),
            signed_at: descriptor.signed_at,
            size: signed.len() as u64,
        };

        self.repository.add_document(record.clone())?;
        self.repository.save_changes()?;
        Ok(record)
    }

    fn roll_back(&self, stored: &[String]) {
        for path in stored {
            if let Err(e) = self.storage.delete(path) {
                log::warn!("Failed to remove stored file {} during rollback: {}", path, e);
            }
        }
        if let Err(e) = self.repository.discard_changes() {
            log::warn!("Failed to discard staged records during rollback: {}", e);
        }
    }
}

fn validate_request(request: &SignRequest<'_>) -> Result<()> {
    if request.content.is_empty() {
        return Err(Error::InvalidInput("document is empty".to_string()));
    }
    if request.document_name.trim().is_empty() {
        return Err(Error::InvalidInput("document name is empty".to_string()));
    }
    if request.signer.id.trim().is_empty() || request.signer.name.trim().is_empty() {
        return Err(Error::InvalidInput("signer id and name are required".to_string()));
    }
    if request.keys.public_key.is_empty() || request.keys.private_key.is_empty() {
        return Err(Error::InvalidInput("key pair is incomplete".to_string()));
    }
    Ok(())
}

fn enter(stage: SigningStage, document_name: &str) {
    log::debug!("Signing {}: {}", document_name, stage);
}

fn failed(stage: SigningStage, error: Error) -> Error {
    log::error!("Signing failed while {}: {}", stage, error);
    error
}
