//! Thin helpers over the `lopdf` object model.
//!
//! Everything that needs to find the catalog or walk the page tree goes
//! through here.

use crate::error::{Error, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Parse PDF bytes.
pub fn load(bytes: &[u8]) -> Result<Document> {
    if bytes.is_empty() {
        return Err(Error::MalformedDocument("empty input".to_string()));
    }
    Ok(Document::load_mem(bytes)?)
}

/// Serialize a document to bytes.
pub fn save(doc: &mut Document) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// Object id of the document catalog.
pub fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| Error::MalformedDocument("trailer has no /Root reference".to_string()))
}

/// Catalog dictionary.
pub fn catalog(doc: &Document) -> Result<&Dictionary> {
    let id = catalog_id(doc)?;
    doc.get_object(id)
        .and_then(Object::as_dict)
        .map_err(|_| Error::MalformedDocument("catalog is not a dictionary".to_string()))
}

/// Mutable catalog dictionary.
pub fn catalog_mut(doc: &mut Document) -> Result<&mut Dictionary> {
    let id = catalog_id(doc)?;
    dict_mut(doc, id)
}

/// Mutable dictionary for an indirect object that must be a dictionary.
pub fn dict_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| Error::MalformedDocument(format!("object {} {} R is not a dictionary", id.0, id.1)))
}

/// Object id of the root page tree node.
pub fn pages_root_id(doc: &Document) -> Result<ObjectId> {
    catalog(doc)?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| Error::MalformedDocument("catalog has no /Pages reference".to_string()))
}

/// Number of pages reachable through the page tree.
pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// Page object ids in document order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn two_page_document() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..2 {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_load_rejects_empty_and_garbage() {
        assert!(matches!(load(b""), Err(Error::MalformedDocument(_))));
        assert!(matches!(load(b"hello world"), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_catalog_and_pages() {
        let doc = two_page_document();
        let catalog = catalog(&doc).unwrap();
        assert_eq!(catalog.get(b"Type").unwrap().as_name().unwrap(), b"Catalog");
        assert_eq!(page_count(&doc), 2);
        assert_eq!(page_ids(&doc).len(), 2);
        assert!(pages_root_id(&doc).is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let mut doc = two_page_document();
        let bytes = save(&mut doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let reloaded = load(&bytes).unwrap();
        assert_eq!(page_count(&reloaded), 2);
    }
}
