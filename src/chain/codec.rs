//! Reading and writing the chain object inside a PDF.

use super::descriptor::{verify_sequence, SignatureDescriptor};
use super::rdf::{decode_packet, encode_packet};
use crate::error::{Error, Result};
use crate::normalize::normalize_document;
use crate::pdf;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Catalog key referencing the chain stream.
pub const CHAIN_CATALOG_KEY: &[u8] = b"PQCSignatureMetadata";

/// `/Type` of the chain stream.
pub const CHAIN_STREAM_TYPE: &str = "PQCSignatureMetadata";

/// Signature chain encoder/decoder.
///
/// Byte-level operations parse the document, apply the change and return
/// normalized bytes. The document-level helpers are used by the composer,
/// which batches several edits before normalizing once.
pub struct ChainCodec;

impl ChainCodec {
    /// Extract the chain sorted ascending by order.
    ///
    /// A document without a chain object yields an empty list.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pqsign::chain::ChainCodec;
    ///
    /// let bytes = std::fs::read("signed.pdf")?;
    /// for descriptor in ChainCodec::extract_chain(&bytes)? {
    ///     println!("#{} {} ({})", descriptor.order, descriptor.signer_name, descriptor.algorithm);
    /// }
    /// # Ok::<(), pqsign::error::Error>(())
    /// ```
    pub fn extract_chain(bytes: &[u8]) -> Result<Vec<SignatureDescriptor>> {
        let doc = pdf::load(bytes)?;
        Self::read_chain(&doc)
    }

    /// Append `descriptor` as entry `count + 1` and return normalized bytes.
    ///
    /// The descriptor's own `order` is overwritten. An existing chain whose
    /// order sequence is not `1..=N` is rejected as `ChainCorrupted`.
    pub fn append_entry(bytes: &[u8], descriptor: &SignatureDescriptor) -> Result<Vec<u8>> {
        let mut doc = pdf::load(bytes)?;
        Self::append_to_document(&mut doc, descriptor)?;
        normalize_document(doc)
    }

    /// Remove the entry with the given order and return normalized bytes.
    ///
    /// Removing the only entry deletes the chain object and its catalog key.
    pub fn remove_entry(bytes: &[u8], order: u32) -> Result<Vec<u8>> {
        let mut doc = pdf::load(bytes)?;
        Self::remove_from_document(&mut doc, order)?;
        normalize_document(doc)
    }

    /// Read the chain of a parsed document, sorted ascending by order.
    pub fn read_chain(doc: &Document) -> Result<Vec<SignatureDescriptor>> {
        let stream_id = match Self::chain_object_id(doc)? {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let stream = doc
            .get_object(stream_id)
            .and_then(Object::as_stream)
            .map_err(|_| Error::ChainCorrupted("chain object is not a stream".to_string()))?;

        let content = if stream.dict.has(b"Filter") {
            stream
                .decompressed_content()
                .map_err(|e| Error::ChainCorrupted(format!("cannot decode chain stream: {}", e)))?
        } else {
            stream.content.clone()
        };

        let xml = String::from_utf8(content)
            .map_err(|_| Error::ChainCorrupted("chain stream is not UTF-8".to_string()))?;

        let mut descriptors = decode_packet(&xml)?;
        descriptors.sort_by_key(|d| d.order);
        Ok(descriptors)
    }

    /// Append to a parsed document without normalizing.
    ///
    /// Returns the descriptor as stored, with its assigned order.
    pub fn append_to_document(doc: &mut Document, descriptor: &SignatureDescriptor) -> Result<SignatureDescriptor> {
        let mut descriptors = Self::read_chain(doc)?;
        verify_sequence(&descriptors)?;

        let mut stored = descriptor.clone();
        stored.order = descriptors.len() as u32 + 1;
        if stored.order != descriptor.order {
            log::debug!("Assigning chain order {} (descriptor carried {})", stored.order, descriptor.order);
        }
        descriptors.push(stored.clone());

        Self::write_chain(doc, &descriptors)?;
        Ok(stored)
    }

    /// Remove one entry from a parsed document without normalizing.
    pub fn remove_from_document(doc: &mut Document, order: u32) -> Result<SignatureDescriptor> {
        let mut descriptors = Self::read_chain(doc)?;
        let index = descriptors
            .iter()
            .position(|d| d.order == order)
            .ok_or_else(|| Error::InvalidInput(format!("chain has no signature with order {}", order)))?;
        let removed = descriptors.remove(index);

        Self::write_chain(doc, &descriptors)?;
        Ok(removed)
    }

    /// Replace the chain content.
    ///
    /// An existing chain stream is rewritten in place so its object number
    /// does not move; an empty chain removes the object entirely.
    pub fn write_chain(doc: &mut Document, descriptors: &[SignatureDescriptor]) -> Result<()> {
        let existing = Self::chain_object_id(doc)?;

        if descriptors.is_empty() {
            pdf::catalog_mut(doc)?.remove(CHAIN_CATALOG_KEY);
            if let Some(id) = existing {
                doc.objects.remove(&id);
            }
            return Ok(());
        }

        let packet = encode_packet(descriptors).into_bytes();

        if let Some(id) = existing {
            if let Ok(stream) = doc.get_object_mut(id).and_then(Object::as_stream_mut) {
                stream.dict.remove(b"Filter");
                stream.dict.remove(b"DecodeParms");
                stream.set_content(packet);
                return Ok(());
            }
            log::warn!("Replacing non-stream chain object {} {} R", id.0, id.1);
        }

        let stream_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => CHAIN_STREAM_TYPE,
                "Subtype" => "XML",
            },
            packet,
        ));
        pdf::catalog_mut(doc)?.set(CHAIN_CATALOG_KEY, stream_id);
        Ok(())
    }

    fn chain_object_id(doc: &Document) -> Result<Option<ObjectId>> {
        match pdf::catalog(doc)?.get(CHAIN_CATALOG_KEY) {
            Ok(Object::Reference(id)) => Ok(Some(*id)),
            Ok(_) => Err(Error::ChainCorrupted(
                "/PQCSignatureMetadata is not an indirect reference".to_string(),
            )),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn blank_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        pdf::save(&mut doc).unwrap()
    }

    fn descriptor(order: u32) -> SignatureDescriptor {
        SignatureDescriptor {
            order,
            document_id: "doc-42".to_string(),
            signer_name: "Carol".to_string(),
            signer_id: Some("carol".to_string()),
            signed_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, order).unwrap(),
            algorithm: "ML-DSA-87".to_string(),
            document_hash: "ZGlnZXN0".to_string(),
            signature_value: "c2lnbmF0dXJl".to_string(),
            public_key: "cHVibGlj".to_string(),
        }
    }

    #[test]
    fn test_no_chain_is_empty() {
        assert!(ChainCodec::extract_chain(&blank_pdf()).unwrap().is_empty());
    }

    #[test]
    fn test_append_assigns_next_order() {
        let once = ChainCodec::append_entry(&blank_pdf(), &descriptor(7)).unwrap();
        let twice = ChainCodec::append_entry(&once, &descriptor(7)).unwrap();

        let chain = ChainCodec::extract_chain(&twice).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].order, 1);
        assert_eq!(chain[1].order, 2);
    }

    #[test]
    fn test_chain_stream_dictionary() {
        let bytes = ChainCodec::append_entry(&blank_pdf(), &descriptor(1)).unwrap();
        let doc = pdf::load(&bytes).unwrap();
        let id = pdf::catalog(&doc)
            .unwrap()
            .get(CHAIN_CATALOG_KEY)
            .unwrap()
            .as_reference()
            .unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Type").unwrap().as_name().unwrap(), b"PQCSignatureMetadata");
        assert_eq!(stream.dict.get(b"Subtype").unwrap().as_name().unwrap(), b"XML");
    }

    #[test]
    fn test_remove_last_entry_deletes_object() {
        let signed = ChainCodec::append_entry(&blank_pdf(), &descriptor(1)).unwrap();
        let removed = ChainCodec::remove_entry(&signed, 1).unwrap();

        let doc = pdf::load(&removed).unwrap();
        assert!(!pdf::catalog(&doc).unwrap().has(CHAIN_CATALOG_KEY));
        assert_eq!(removed, crate::normalize::normalize(&blank_pdf()).unwrap());
    }

    #[test]
    fn test_remove_newest_restores_previous_bytes() {
        let one = ChainCodec::append_entry(&blank_pdf(), &descriptor(1)).unwrap();
        let two = ChainCodec::append_entry(&one, &descriptor(2)).unwrap();
        assert_eq!(ChainCodec::remove_entry(&two, 2).unwrap(), one);
    }

    #[test]
    fn test_remove_unknown_order() {
        let one = ChainCodec::append_entry(&blank_pdf(), &descriptor(1)).unwrap();
        assert!(matches!(ChainCodec::remove_entry(&one, 5), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_append_rejects_broken_sequence() {
        let mut doc = pdf::load(&blank_pdf()).unwrap();
        ChainCodec::write_chain(&mut doc, &[descriptor(1), descriptor(3)]).unwrap();
        let bytes = pdf::save(&mut doc).unwrap();

        assert!(matches!(
            ChainCodec::append_entry(&bytes, &descriptor(4)),
            Err(Error::ChainCorrupted(_))
        ));
    }

    #[test]
    fn test_unparsable_chain_is_corrupted() {
        let mut doc = pdf::load(&blank_pdf()).unwrap();
        let id = doc.add_object(Stream::new(dictionary! {}, b"<not-xml".to_vec()));
        pdf::catalog_mut(&mut doc).unwrap().set(CHAIN_CATALOG_KEY, id);
        let bytes = pdf::save(&mut doc).unwrap();

        assert!(matches!(ChainCodec::extract_chain(&bytes), Err(Error::ChainCorrupted(_))));
    }
}
