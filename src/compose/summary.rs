//! One-page signature certificate.
//!
//! The page is cosmetic: validation never reads it back except to find and
//! remove it by its `/PQCSignatureOrder` marker.

use crate::chain::SignatureDescriptor;
use crate::error::Result;
use crate::pdf;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

/// Renders the visual summary page appended for each signature.
pub trait SummaryPageRenderer: Send + Sync {
    /// Produce a single-page PDF describing `descriptor`.
    fn render(&self, descriptor: &SignatureDescriptor, document_name: &str) -> Result<Vec<u8>>;
}

/// Width of a Courier glyph as a fraction of the font size.
const COURIER_ADVANCE: f32 = 0.6;

/// Font sizes tried, largest first, when fitting the signature block.
const SIGNATURE_FONT_SIZES: [f32; 6] = [9.0, 8.0, 7.0, 6.0, 5.0, 4.0];

/// Renders an A4 certificate listing the signer, timestamp, algorithm, hash
/// and the signature value.
#[derive(Debug, Clone)]
pub struct CertificatePageRenderer {
    width: f32,
    height: f32,
    margin: f32,
}

impl Default for CertificatePageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificatePageRenderer {
    /// A4 portrait with 50pt margins.
    pub fn new() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            margin: 50.0,
        }
    }

    /// Override the page size in points.
    pub fn with_page_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn operations(&self, descriptor: &SignatureDescriptor, document_name: &str) -> Vec<Operation> {
        let mut ops = Vec::new();
        let left = self.margin;
        let mut y = self.height - self.margin - 16.0;

        push_text(&mut ops, "F2", 16.0, left, y, "Post-Quantum Digital Signature Certificate");
        y -= 34.0;

        let signed_at = descriptor.signed_at.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string();
        let order = descriptor.order.to_string();
        let rows: [(&str, &str); 7] = [
            ("Document", document_name),
            ("Document ID", descriptor.document_id.as_str()),
            ("Signature order", order.as_str()),
            ("Signer", descriptor.signer_name.as_str()),
            ("Signer ID", descriptor.signer_id.as_deref().unwrap_or("-")),
            ("Signed at", signed_at.as_str()),
            ("Algorithm", descriptor.algorithm.as_str()),
        ];
        for (label, value) in rows {
            push_text(&mut ops, "F2", 10.0, left, y, &format!("{}:", label));
            push_text(&mut ops, "F1", 10.0, left + 110.0, y, value);
            y -= 16.0;
        }

        y -= 10.0;
        push_text(&mut ops, "F2", 10.0, left, y, "Document hash (SHA-256):");
        y -= 14.0;
        push_text(&mut ops, "F3", 9.0, left, y, &descriptor.document_hash);
        y -= 24.0;

        push_text(&mut ops, "F2", 10.0, left, y, "Signature value:");
        y -= 14.0;

        let footer_height = 40.0;
        let available = y - self.margin - footer_height;
        let usable_width = self.width - 2.0 * self.margin;
        let (size, lines) = fit_block(&descriptor.signature_value, usable_width, available);
        for line in lines {
            push_text(&mut ops, "F3", size, left, y, &line);
            y -= size * 1.2;
        }

        push_text(
            &mut ops,
            "F1",
            8.0,
            left,
            self.margin + 14.0,
            &format!(
                "Signed with {}, a post-quantum signature algorithm. Verify with the embedded signature chain.",
                descriptor.algorithm
            ),
        );
        push_text(
            &mut ops,
            "F2",
            8.0,
            left,
            self.margin,
            &format!("End of signature record #{} - {}", descriptor.order, descriptor.signer_name),
        );

        ops
    }
}

impl SummaryPageRenderer for CertificatePageRenderer {
    fn render(&self, descriptor: &SignatureDescriptor, document_name: &str) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let regular = doc.add_object(type1_font("Helvetica"));
        let bold = doc.add_object(type1_font("Helvetica-Bold"));
        let mono = doc.add_object(type1_font("Courier"));

        let content = Content {
            operations: self.operations(descriptor, document_name),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), self.width.into(), self.height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "F1" => regular,
                    "F2" => bold,
                    "F3" => mono,
                },
            },
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

        pdf::save(&mut doc)
    }
}

fn type1_font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn push_text(ops: &mut Vec<Operation>, font: &str, size: f32, x: f32, y: f32, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(latin_text(text))]));
    ops.push(Operation::new("ET", vec![]));
}

/// Standard Type1 fonts only cover Latin-1; anything else becomes `?`.
fn latin_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 0x100 { c as u32 as u8 } else { b'?' })
        .collect()
}

/// Pick the largest monospace size at which `text` fits in the box, wrapping
/// it into lines. At the smallest size the text is cut and marked with `...`.
fn fit_block(text: &str, width: f32, height: f32) -> (f32, Vec<String>) {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();

    for size in SIGNATURE_FONT_SIZES {
        let per_line = ((width / (size * COURIER_ADVANCE)).floor() as usize).max(1);
        let max_lines = (height / (size * 1.2)).floor() as usize;
        let needed = chars.len().div_ceil(per_line);
        if needed <= max_lines {
            return (size, wrap(&chars, per_line));
        }
    }

    let size = SIGNATURE_FONT_SIZES[SIGNATURE_FONT_SIZES.len() - 1];
    let per_line = ((width / (size * COURIER_ADVANCE)).floor() as usize).max(1);
    let max_lines = ((height / (size * 1.2)).floor() as usize).max(1);
    let mut lines = wrap(&chars, per_line);
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        let keep = last.chars().count().saturating_sub(3);
        *last = last.chars().take(keep).collect::<String>() + "...";
    }
    (size, lines)
}

fn wrap(chars: &[char], per_line: usize) -> Vec<String> {
    chars.chunks(per_line).map(|chunk| chunk.iter().collect()).collect()
}
