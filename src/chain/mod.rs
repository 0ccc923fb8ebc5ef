//! Signature chain embedded in the document catalog.
//!
//! The chain is an ordered list of [`SignatureDescriptor`]s serialized as an
//! XMP packet (see [`rdf`]) in a stream referenced from the catalog key
//! `/PQCSignatureMetadata`. [`ChainCodec`] reads, appends and removes entries.

pub mod codec;
pub mod descriptor;
pub mod rdf;

pub use codec::{ChainCodec, CHAIN_CATALOG_KEY};
pub use descriptor::{chain_timestamp, verify_sequence, SignatureDescriptor};
