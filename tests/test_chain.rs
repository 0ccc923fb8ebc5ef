//! Integration tests for the embedded signature chain.

mod common;

use common::sample_pdf;
use pqsign::chain::{ChainCodec, SignatureDescriptor, CHAIN_CATALOG_KEY};
use pqsign::compose::{CertificatePageRenderer, DocumentComposer, PdfComposer, SummaryPageRenderer};
use pqsign::error::Error;
use pqsign::normalize;

fn descriptor(order: u32, signer: &str) -> SignatureDescriptor {
    SignatureDescriptor {
        order,
        document_id: "4f1c2a9e-0d7b-4d2e-9a51-3c8f6b1e7a20".to_string(),
        signer_name: format!("{} & Partners <Legal>", signer),
        signer_id: Some(signer.to_lowercase()),
        signed_at: chrono::DateTime::parse_from_rfc3339("2024-06-30T23:59:59.999Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
        algorithm: "ML-DSA-87".to_string(),
        document_hash: "n4bQgYhMfWWaL+qgxVrQFaO/TxsrC4Is0V1sFbDwCgg=".to_string(),
        signature_value: "AAECAwQFBgcICQ==".to_string(),
        public_key: "LS0tLS1CRUdJTiBNTC1EU0EtODcgUFVCTElDIEtFWS0tLS0t".to_string(),
    }
}

fn has_chain_key(pdf: &[u8]) -> bool {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_dictionary(root).unwrap().has(CHAIN_CATALOG_KEY)
}

mod codec {
    use super::*;

    #[test]
    fn test_append_places_entry_after_existing() {
        let mut pdf = normalize(&sample_pdf(1, "Chain", false)).unwrap();
        for (index, signer) in ["Alice", "Bob", "Carol"].iter().enumerate() {
            let before = ChainCodec::extract_chain(&pdf).unwrap().len();
            pdf = ChainCodec::append_entry(&pdf, &descriptor(99, signer)).unwrap();

            let chain = ChainCodec::extract_chain(&pdf).unwrap();
            assert_eq!(chain.len(), before + 1);
            let added = &chain[index];
            assert_eq!(added.order as usize, before + 1);
            assert_eq!(added.signer_name, descriptor(0, signer).signer_name);
        }
    }

    #[test]
    fn test_remove_excludes_entry() {
        let base = normalize(&sample_pdf(1, "Chain", false)).unwrap();
        let one = ChainCodec::append_entry(&base, &descriptor(1, "Alice")).unwrap();
        let two = ChainCodec::append_entry(&one, &descriptor(2, "Bob")).unwrap();

        let removed = ChainCodec::remove_entry(&two, 2).unwrap();
        let chain = ChainCodec::extract_chain(&removed).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.iter().all(|d| d.signer_id.as_deref() != Some("bob")));
        assert!(has_chain_key(&removed));
    }

    #[test]
    fn test_removing_only_entry_deletes_container() {
        let base = normalize(&sample_pdf(1, "Chain", false)).unwrap();
        let one = ChainCodec::append_entry(&base, &descriptor(1, "Alice")).unwrap();
        assert!(has_chain_key(&one));

        let removed = ChainCodec::remove_entry(&one, 1).unwrap();
        assert!(!has_chain_key(&removed));
        assert!(ChainCodec::extract_chain(&removed).unwrap().is_empty());
        assert_eq!(removed, base);
    }

    #[test]
    fn test_special_characters_survive() {
        let pdf = ChainCodec::append_entry(&sample_pdf(1, "Chain", false), &descriptor(1, "O'Brien")).unwrap();
        let chain = ChainCodec::extract_chain(&pdf).unwrap();
        assert_eq!(chain[0].signer_name, "O'Brien & Partners <Legal>");
        assert_eq!(chain[0].signed_at_text(), "2024-06-30T23:59:59.999Z");
    }

    #[test]
    fn test_extract_from_non_pdf() {
        assert!(matches!(
            ChainCodec::extract_chain(b"%PDF-1.7 garbage"),
            Err(Error::MalformedDocument(_))
        ));
    }
}

mod layers {
    use super::*;

    #[test]
    fn test_compose_and_peel_three_layers() {
        let composer = PdfComposer::new();
        let renderer = CertificatePageRenderer::new();

        let mut versions = vec![composer.normalize(&sample_pdf(3, "Layers", true)).unwrap()];
        for (index, signer) in ["Alice", "Bob", "Carol"].iter().enumerate() {
            let d = descriptor(index as u32 + 1, signer);
            let page = renderer.render(&d, "layers.pdf").unwrap();
            let current = versions.last().unwrap();
            versions.push(composer.compose(current, &page, &d).unwrap());
        }

        let top = versions.last().unwrap().clone();
        assert_eq!(lopdf::Document::load_mem(&top).unwrap().get_pages().len(), 6);

        let mut working = top;
        for order in (1..=3u32).rev() {
            working = composer.peel(&working, order).unwrap();
            assert_eq!(working, versions[order as usize - 1], "peeling layer {}", order);
        }
    }
}
