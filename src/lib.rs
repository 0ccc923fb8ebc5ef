// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # pqsign
//!
//! Post-quantum signature chains for PDF documents.
//!
//! Every signing event appends one descriptor to an ordered chain stored in the
//! document catalog, plus a one-page certificate summarizing the signature.
//! Validation walks the chain newest to oldest, verifies each signature through
//! an external ML-DSA engine, then peels that layer off and continues.
//!
//! ## Core Features
//!
//! - **Normalization**: deterministic, idempotent rewrite of a PDF so hashes are stable
//! - **Chain codec**: XMP/RDF packet under the catalog key `/PQCSignatureMetadata`
//! - **Signing**: normalize, hash, sign, compose the certificate page, persist
//! - **Validation**: per-signature report (record lookup, hash checks, cryptographic verify)
//! - **External engine**: process-backed `sign`/`verify`/`keygen` with scoped temp artifacts
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pqsign::config::EngineConfig;
//! use pqsign::engine::{NativeEngine, SignatureEngine};
//! use pqsign::repository::InMemoryRepository;
//! use pqsign::signing::{SignRequest, SignerIdentity, SigningOrchestrator};
//! use pqsign::storage::LocalFileStorage;
//! use pqsign::validation::ValidationEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(NativeEngine::new(EngineConfig::new("/usr/local/bin/pqc-cli")));
//! let repository = Arc::new(InMemoryRepository::new());
//! let storage = Arc::new(LocalFileStorage::new("documents")?);
//!
//! let keys = engine.generate_key_pair("ML-DSA-65")?;
//! let signer = SigningOrchestrator::new(engine.clone(), repository.clone(), storage.clone());
//! let signed = signer.sign(SignRequest {
//!     document_name: "contract.pdf".to_string(),
//!     content: std::fs::read("contract.pdf")?,
//!     signer: SignerIdentity::new("alice", "Alice Example"),
//!     keys: &keys,
//! })?;
//!
//! let validator = ValidationEngine::new(engine, repository, storage);
//! let report = validator.validate(&signed.content)?;
//! println!("{}: {}", report.status, report.message);
//! # Ok(())
//! # }
//! ```

pub mod error;

// Configuration
pub mod config;

// Document handling
pub mod digest;
pub mod normalize;
pub mod pdf;

// Signature chain
pub mod chain;
pub mod compose;

// External signing engine
pub mod engine;

// Collaborators
pub mod keys;
pub mod repository;
pub mod storage;

// Workflows
pub mod signing;
pub mod validation;

// Re-exports
pub use chain::{ChainCodec, SignatureDescriptor};
pub use compose::{DocumentComposer, PdfComposer};
pub use error::{Error, Result};
pub use normalize::normalize;
pub use signing::SigningOrchestrator;
pub use validation::{ValidationEngine, ValidationReport, ValidationStatus};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
