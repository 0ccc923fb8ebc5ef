//! Document composition: adding and peeling signature layers.
//!
//! A signature layer is one certificate page plus one chain entry. Signing
//! adds a layer on top of the normalized document; validation peels the
//! newest layer off again. Peeling must reproduce the exact normalized bytes
//! that were signed, so every edit here either appends objects with fresh
//! numbers or rewrites an existing object in place.

pub mod summary;

pub use summary::{CertificatePageRenderer, SummaryPageRenderer};

use crate::chain::{ChainCodec, SignatureDescriptor};
use crate::error::{Error, Result};
use crate::normalize::{normalize, normalize_document};
use crate::pdf;
use lopdf::{Document, Object, ObjectId};

/// Page dictionary key marking a certificate page with its signature order.
pub const ORDER_MARKER_KEY: &[u8] = b"PQCSignatureOrder";

/// Operations the signing and validation workflows need from a PDF backend.
///
/// Every method takes and returns complete PDF bytes; outputs are normalized.
pub trait DocumentComposer: Send + Sync {
    /// Deterministic byte-stable rewrite.
    fn normalize(&self, pdf: &[u8]) -> Result<Vec<u8>>;

    /// Chain sorted ascending by order.
    fn extract_chain(&self, pdf: &[u8]) -> Result<Vec<SignatureDescriptor>>;

    /// Append every page of `page_pdf` after the last page, tagged with `order`.
    fn add_metadata_page(&self, pdf: &[u8], page_pdf: &[u8], order: u32) -> Result<Vec<u8>>;

    /// Append a chain entry as `count + 1`.
    fn add_chain_entry(&self, pdf: &[u8], descriptor: &SignatureDescriptor) -> Result<Vec<u8>>;

    /// Remove the chain entry with `order`.
    fn remove_chain_entry(&self, pdf: &[u8], order: u32) -> Result<Vec<u8>>;

    /// Remove the certificate page tagged with `order`, or the last page when
    /// no page carries the tag.
    fn remove_metadata_page(&self, pdf: &[u8], order: u32) -> Result<Vec<u8>>;

    /// Add a full signature layer: certificate page, then chain entry.
    fn compose(&self, normalized: &[u8], page_pdf: &[u8], descriptor: &SignatureDescriptor) -> Result<Vec<u8>> {
        let merged = self.add_metadata_page(normalized, page_pdf, descriptor.order)?;
        self.add_chain_entry(&merged, descriptor)
    }

    /// Remove the signature layer with `order`.
    fn peel(&self, pdf: &[u8], order: u32) -> Result<Vec<u8>> {
        let without_entry = self.remove_chain_entry(pdf, order)?;
        self.remove_metadata_page(&without_entry, order)
    }
}

/// [`DocumentComposer`] backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfComposer;

impl PdfComposer {
    /// Create a composer.
    pub fn new() -> Self {
        Self
    }

    /// Merge all pages of `secondary` into `primary` under its root page node.
    ///
    /// Secondary objects are renumbered above `primary.max_id`, so existing
    /// object numbers never move. Objects that end up unreachable (the
    /// secondary catalog and page tree) are dropped by normalization.
    fn merge_pages(primary: &mut Document, mut secondary: Document, order: u32) -> Result<()> {
        secondary.renumber_objects_with(primary.max_id + 1);
        let new_pages: Vec<ObjectId> = pdf::page_ids(&secondary);
        if new_pages.is_empty() {
            return Err(Error::InvalidInput("certificate page document has no pages".to_string()));
        }

        for (id, object) in std::mem::take(&mut secondary.objects) {
            primary.objects.insert(id, object);
        }
        primary.max_id = primary.max_id.max(secondary.max_id);

        let root_id = pdf::pages_root_id(primary)?;
        {
            let root = pdf::dict_mut(primary, root_id)?;
            let kids = root
                .get_mut(b"Kids")
                .and_then(Object::as_array_mut)
                .map_err(|_| Error::MalformedDocument("root page node has no /Kids".to_string()))?;
            for page_id in &new_pages {
                kids.push(Object::Reference(*page_id));
            }
            let count = root.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
            root.set("Count", count + new_pages.len() as i64);
        }

        for page_id in new_pages {
            let page = pdf::dict_mut(primary, page_id)?;
            page.set("Parent", root_id);
            page.set(ORDER_MARKER_KEY, order as i64);
        }

        Ok(())
    }

    /// Find the certificate page for `order`, falling back to the last page.
    fn find_marked_page(doc: &Document, order: u32) -> Result<ObjectId> {
        let pages = pdf::page_ids(doc);
        let marked = pages.iter().copied().find(|id| {
            doc.get_dictionary(*id)
                .and_then(|page| page.get(ORDER_MARKER_KEY))
                .and_then(Object::as_i64)
                .map(|value| value == order as i64)
                .unwrap_or(false)
        });

        match marked {
            Some(id) => Ok(id),
            None => {
                log::warn!("No page tagged for signature {}, removing the last page", order);
                pages
                    .last()
                    .copied()
                    .ok_or_else(|| Error::MalformedDocument("document has no pages".to_string()))
            },
        }
    }

    /// Detach a page from the page tree and delete the page object.
    ///
    /// Resources only used by the page become unreachable and are pruned by
    /// normalization.
    fn remove_page(doc: &mut Document, page_id: ObjectId) -> Result<()> {
        let parent_id = doc
            .get_dictionary(page_id)
            .and_then(|page| page.get(b"Parent"))
            .and_then(Object::as_reference)
            .map_err(|_| Error::MalformedDocument("page has no /Parent".to_string()))?;

        {
            let parent = pdf::dict_mut(doc, parent_id)?;
            let kids = parent
                .get_mut(b"Kids")
                .and_then(Object::as_array_mut)
                .map_err(|_| Error::MalformedDocument("page node has no /Kids".to_string()))?;
            let before = kids.len();
            kids.retain(|kid| kid.as_reference().map(|id| id != page_id).unwrap_or(true));
            if kids.len() == before {
                return Err(Error::MalformedDocument("page is not listed by its parent".to_string()));
            }
        }

        // Every ancestor counts the removed leaf.
        let mut node = Some(parent_id);
        let mut visited = 0usize;
        while let Some(node_id) = node {
            visited += 1;
            if visited > doc.objects.len() {
                return Err(Error::MalformedDocument("cycle in page tree".to_string()));
            }
            let dict = pdf::dict_mut(doc, node_id)?;
            let count = dict.get(b"Count").and_then(Object::as_i64).unwrap_or(1);
            dict.set("Count", (count - 1).max(0));
            node = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }

        doc.objects.remove(&page_id);
        Ok(())
    }
}

impl DocumentComposer for PdfComposer {
    fn normalize(&self, pdf: &[u8]) -> Result<Vec<u8>> {
        normalize(pdf)
    }

    fn extract_chain(&self, pdf: &[u8]) -> Result<Vec<SignatureDescriptor>> {
        ChainCodec::extract_chain(pdf)
    }

    fn add_metadata_page(&self, pdf: &[u8], page_pdf: &[u8], order: u32) -> Result<Vec<u8>> {
        let mut doc = pdf::load(pdf)?;
        let page_doc = pdf::load(page_pdf)?;
        Self::merge_pages(&mut doc, page_doc, order)?;
        normalize_document(doc)
    }

    fn add_chain_entry(&self, pdf: &[u8], descriptor: &SignatureDescriptor) -> Result<Vec<u8>> {
        ChainCodec::append_entry(pdf, descriptor)
    }

    fn remove_chain_entry(&self, pdf: &[u8], order: u32) -> Result<Vec<u8>> {
        ChainCodec::remove_entry(pdf, order)
    }

    fn remove_metadata_page(&self, pdf: &[u8], order: u32) -> Result<Vec<u8>> {
        let mut doc = pdf::load(pdf)?;
        let page_id = Self::find_marked_page(&doc, order)?;
        Self::remove_page(&mut doc, page_id)?;
        normalize_document(doc)
    }
}
