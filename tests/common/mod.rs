//! Shared helpers for integration tests.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};
use pqsign::digest::sha256;
use pqsign::engine::{EngineSignature, KeyPair, SignatureEngine};
use pqsign::error::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build a small PDF with `pages` text pages and, optionally, the volatile
/// fields normalization strips.
pub fn sample_pdf(pages: usize, title: &str, with_noise: bool) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for index in 0..pages {
        let text = format!("BT /F1 14 Tf 72 720 Td ({} page {}) Tj ET", title, index + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut info = dictionary! { "Title" => Object::string_literal(title) };
    if with_noise {
        info.set("Producer", Object::string_literal("Office Writer 7.2"));
        info.set("CreationDate", Object::string_literal("D:20240101120000Z"));
        info.set("ModDate", Object::string_literal("D:20240301090000Z"));
        doc.trailer.set(
            "ID",
            vec![Object::string_literal("0123456789"), Object::string_literal("9876543210")],
        );
    }
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save sample pdf");
    bytes
}

/// Key pair understood by [`FakeEngine`].
pub fn fake_keys(secret: &str) -> KeyPair {
    KeyPair::new(
        format!("-----BEGIN ML-DSA-44 PUBLIC KEY-----\n{}\n-----END ML-DSA-44 PUBLIC KEY-----\n", secret)
            .into_bytes(),
        format!("secret:{}", secret).into_bytes(),
    )
}

/// In-process engine: the signature is `sha256(private key || data)`.
#[derive(Debug, Default)]
pub struct FakeEngine {
    sign_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn signature_for(private_key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut input = private_key.to_vec();
        input.extend_from_slice(data);
        sha256(&input).to_vec()
    }

    fn private_from_public(public_key: &[u8]) -> Vec<u8> {
        let text = String::from_utf8_lossy(public_key);
        let secret = text.lines().nth(1).unwrap_or_default();
        format!("secret:{}", secret).into_bytes()
    }
}

impl SignatureEngine for FakeEngine {
    fn sign(&self, data: &[u8], private_key: &[u8]) -> Result<EngineSignature> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(EngineSignature {
            signature: Self::signature_for(private_key, data),
            algorithm: "ML-DSA-44".to_string(),
        })
    }

    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let expected = Self::signature_for(&Self::private_from_public(public_key), data);
        Ok(expected == signature)
    }

    fn generate_key_pair(&self, _algorithm: &str) -> Result<KeyPair> {
        Ok(fake_keys("generated"))
    }
}

/// Number of regular files below `dir`.
pub fn count_files(dir: &std::path::Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
