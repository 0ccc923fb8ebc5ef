//! Deterministic PDF normalization.
//!
//! Signatures are computed over normalized bytes, so the same logical document
//! must always serialize to the same bytes. Normalization removes the volatile
//! parts a writer touches on every save (producer, timestamps, file
//! identifiers, the standard XMP metadata stream, cross-reference stream
//! bookkeeping), drops unreachable objects and numbers the remaining objects
//! contiguously from 1.
//!
//! The signature chain object under `/PQCSignatureMetadata` is left alone.
//! Normalizing a normalized document returns identical bytes.

use crate::error::{Error, Result};
use crate::pdf;
use lopdf::{Dictionary, Document, Object};

/// Document information keys rewritten by every save.
const VOLATILE_INFO_KEYS: &[&[u8]] = &[b"Producer", b"CreationDate", b"ModDate"];

/// Trailer keys left over from cross-reference streams or incremental updates,
/// plus `/Size`, which the writer recomputes and appends.
const XREF_TRAILER_KEYS: &[&[u8]] = &[
    b"ID",
    b"Size",
    b"Type",
    b"W",
    b"Index",
    b"Filter",
    b"DecodeParms",
    b"Length",
    b"Prev",
    b"XRefStm",
];

/// Normalize raw PDF bytes.
///
/// Returns `MalformedDocument` if the input does not parse, is encrypted, or
/// would lose pages during cleanup.
pub fn normalize(bytes: &[u8]) -> Result<Vec<u8>> {
    let doc = pdf::load(bytes)?;
    normalize_document(doc)
}

/// Normalize an already parsed document and serialize it.
pub fn normalize_document(mut doc: Document) -> Result<Vec<u8>> {
    if doc.trailer.has(b"Encrypt") {
        return Err(Error::MalformedDocument("encrypted documents are not supported".to_string()));
    }

    let pages_before = pdf::page_count(&doc);
    if pages_before == 0 {
        return Err(Error::MalformedDocument("document has no pages".to_string()));
    }

    strip_info(&mut doc);
    canonicalize_trailer(&mut doc);
    pdf::catalog_mut(&mut doc)?.remove(b"Metadata");

    let pruned = doc.prune_objects();
    if !pruned.is_empty() {
        log::debug!("Pruned {} unreachable objects", pruned.len());
    }
    doc.renumber_objects();

    let pages_after = pdf::page_count(&doc);
    if pages_after != pages_before {
        return Err(Error::MalformedDocument(format!(
            "normalization changed page count from {} to {}",
            pages_before, pages_after
        )));
    }

    pdf::save(&mut doc)
}

/// Rebuild the trailer as `/Root`, `/Info`, then any remaining keys by name.
///
/// Key order is part of the serialized bytes, and it must not depend on which
/// keys happened to be removed.
fn canonicalize_trailer(doc: &mut Document) {
    let mut rest: Vec<(Vec<u8>, Object)> = doc
        .trailer
        .iter()
        .filter(|(key, _)| !XREF_TRAILER_KEYS.contains(&key.as_slice()))
        .filter(|(key, _)| key.as_slice() != b"Root" && key.as_slice() != b"Info")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));

    let mut trailer = Dictionary::new();
    for key in [b"Root".as_slice(), b"Info".as_slice()] {
        if let Ok(value) = doc.trailer.get(key) {
            trailer.set(key.to_vec(), value.clone());
        }
    }
    for (key, value) in rest {
        trailer.set(key, value);
    }
    doc.trailer = trailer;
}

/// Remove volatile keys from the document information dictionary.
///
/// `/Info` may be an indirect reference (the usual case) or an inline
/// dictionary.
fn strip_info(doc: &mut Document) {
    let info_ref = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(_) => None,
        Err(_) => return,
    };

    let info = match info_ref {
        Some(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut),
        None => doc.trailer.get_mut(b"Info").and_then(Object::as_dict_mut),
    };

    if let Ok(info) = info {
        for key in VOLATILE_INFO_KEYS {
            info.remove(key);
        }
    }
}
