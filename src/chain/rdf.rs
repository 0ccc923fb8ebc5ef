//! XMP/RDF packet holding the signature chain.
//!
//! The packet is a regular XMP document whose description carries one
//! property, `pqc:signatures`, an `rdf:Bag` with one `rdf:li` per signing
//! event:
//!
//! ```text
//! <pqc:signatures>
//!   <rdf:Bag>
//!     <rdf:li rdf:parseType="Resource">
//!       <pqc:order>1</pqc:order>
//!       <pqc:documentId>...</pqc:documentId>
//!       <dc:creator>...</dc:creator>
//!       ...
//!     </rdf:li>
//!   </rdf:Bag>
//! </pqc:signatures>
//! ```
//!
//! Writing is canonical: items in ascending order, fixed field order and
//! indentation. Reading resolves namespaces rather than prefixes and accepts
//! the attribute form of `rdf:li` and nested `rdf:Description` items.

use super::descriptor::{parse_timestamp, SignatureDescriptor};
use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::collections::HashMap;

/// XMP namespace URIs
pub const NS_X: &str = "adobe:ns:meta/";
pub const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NS_PQC: &str = "http://pqc.com/signature/1.0/";

/// Item properties, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Order,
    DocumentId,
    Creator,
    SignerId,
    Date,
    Algorithm,
    DocumentHash,
    SignatureValue,
    PublicKey,
}

impl Field {
    fn from_name(namespace: &[u8], local: &[u8]) -> Option<Self> {
        if namespace == NS_PQC.as_bytes() {
            match local {
                b"order" => Some(Field::Order),
                b"documentId" => Some(Field::DocumentId),
                b"signerId" => Some(Field::SignerId),
                b"algorithm" => Some(Field::Algorithm),
                b"documentHash" => Some(Field::DocumentHash),
                b"signatureValue" => Some(Field::SignatureValue),
                b"publicKey" => Some(Field::PublicKey),
                _ => None,
            }
        } else if namespace == NS_DC.as_bytes() {
            match local {
                b"creator" => Some(Field::Creator),
                b"date" => Some(Field::Date),
                _ => None,
            }
        } else {
            None
        }
    }

    fn qualified_name(self) -> &'static str {
        match self {
            Field::Order => "pqc:order",
            Field::DocumentId => "pqc:documentId",
            Field::Creator => "dc:creator",
            Field::SignerId => "pqc:signerId",
            Field::Date => "dc:date",
            Field::Algorithm => "pqc:algorithm",
            Field::DocumentHash => "pqc:documentHash",
            Field::SignatureValue => "pqc:signatureValue",
            Field::PublicKey => "pqc:publicKey",
        }
    }
}

/// Serialize descriptors into an XMP packet.
///
/// Descriptors are written in ascending `order` regardless of input order.
pub fn encode_packet(descriptors: &[SignatureDescriptor]) -> String {
    let mut sorted: Vec<&SignatureDescriptor> = descriptors.iter().collect();
    sorted.sort_by_key(|d| d.order);

    let mut xml = String::new();

    xml.push_str(r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<x:xmpmeta xmlns:x="{}">"#, NS_X));
    xml.push('\n');
    xml.push_str(&format!(r#"  <rdf:RDF xmlns:rdf="{}">"#, NS_RDF));
    xml.push('\n');
    xml.push_str("    <rdf:Description rdf:about=\"\"\n");
    xml.push_str(&format!("        xmlns:dc=\"{}\"\n", NS_DC));
    xml.push_str(&format!("        xmlns:pqc=\"{}\">\n", NS_PQC));
    xml.push_str("      <pqc:signatures>\n");
    xml.push_str("        <rdf:Bag>\n");

    for descriptor in sorted {
        xml.push_str("          <rdf:li rdf:parseType=\"Resource\">\n");
        push_field(&mut xml, Field::Order, &descriptor.order.to_string());
        push_field(&mut xml, Field::DocumentId, &descriptor.document_id);
        push_field(&mut xml, Field::Creator, &descriptor.signer_name);
        if let Some(signer_id) = &descriptor.signer_id {
            push_field(&mut xml, Field::SignerId, signer_id);
        }
        push_field(&mut xml, Field::Date, &descriptor.signed_at_text());
        push_field(&mut xml, Field::Algorithm, &descriptor.algorithm);
        push_field(&mut xml, Field::DocumentHash, &descriptor.document_hash);
        push_field(&mut xml, Field::SignatureValue, &descriptor.signature_value);
        push_field(&mut xml, Field::PublicKey, &descriptor.public_key);
        xml.push_str("          </rdf:li>\n");
    }

    xml.push_str("        </rdf:Bag>\n");
    xml.push_str("      </pqc:signatures>\n");
    xml.push_str("    </rdf:Description>\n");
    xml.push_str("  </rdf:RDF>\n");
    xml.push_str("</x:xmpmeta>\n");
    xml.push_str(r#"<?xpacket end="w"?>"#);

    xml
}

fn push_field(xml: &mut String, field: Field, value: &str) {
    let name = field.qualified_name();
    xml.push_str(&format!("            <{}>{}</{}>\n", name, escape_xml(value), name));
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Element context while walking the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Signatures,
    Bag,
    /// An `rdf:li` item (`true`) or an `rdf:Description` nested in one
    Item(bool),
    Field(Field),
    Other,
}

#[derive(Debug, Default)]
struct PartialItem {
    fields: HashMap<Field, String>,
}

impl PartialItem {
    fn required(&self, field: Field) -> Result<&str> {
        self.fields
            .get(&field)
            .map(String::as_str)
            .ok_or_else(|| Error::ChainCorrupted(format!("signature entry missing {}", field.qualified_name())))
    }

    fn finish(self) -> Result<SignatureDescriptor> {
        let order_text = self.required(Field::Order)?;
        let order = order_text
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::ChainCorrupted(format!("invalid signature order '{}'", order_text)))?;

        Ok(SignatureDescriptor {
            order,
            document_id: self.required(Field::DocumentId)?.to_string(),
            signer_name: self.required(Field::Creator)?.to_string(),
            signer_id: self.fields.get(&Field::SignerId).filter(|id| !id.is_empty()).cloned(),
            signed_at: parse_timestamp(self.required(Field::Date)?)?,
            algorithm: self.required(Field::Algorithm)?.to_string(),
            document_hash: self.required(Field::DocumentHash)?.to_string(),
            signature_value: self.required(Field::SignatureValue)?.to_string(),
            public_key: self.required(Field::PublicKey)?.to_string(),
        })
    }
}

/// Parse an XMP packet into descriptors, in document order.
///
/// A packet without a `pqc:signatures` bag, malformed XML, or an item lacking
/// a required property is reported as `ChainCorrupted`.
pub fn decode_packet(xml: &str) -> Result<Vec<SignatureDescriptor>> {
    let mut reader = NsReader::from_str(xml);

    let mut stack: Vec<Frame> = Vec::new();
    let mut descriptors = Vec::new();
    let mut current: Option<PartialItem> = None;
    let mut text = String::new();
    // Set when the current field wraps its value in child elements.
    let mut wrapped = false;
    let mut saw_bag = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let frame = classify(&reader, &e, stack.last().copied());
                match frame {
                    Frame::Bag => saw_bag = true,
                    Frame::Item(true) => {
                        let mut item = PartialItem::default();
                        read_attribute_fields(&reader, &e, &mut item)?;
                        current = Some(item);
                    },
                    Frame::Item(false) => {
                        if let Some(item) = current.as_mut() {
                            read_attribute_fields(&reader, &e, item)?;
                        }
                    },
                    Frame::Field(_) => {
                        text.clear();
                        wrapped = false;
                    },
                    Frame::Other if inside_field(&stack) => wrapped = true,
                    _ => {},
                }
                stack.push(frame);
            },
            Ok(Event::Empty(e)) => match classify(&reader, &e, stack.last().copied()) {
                Frame::Bag => saw_bag = true,
                Frame::Item(true) => {
                    let mut item = PartialItem::default();
                    read_attribute_fields(&reader, &e, &mut item)?;
                    descriptors.push(item.finish()?);
                },
                Frame::Item(false) => {
                    if let Some(item) = current.as_mut() {
                        read_attribute_fields(&reader, &e, item)?;
                    }
                },
                Frame::Field(field) => {
                    if let Some(item) = current.as_mut() {
                        item.fields.insert(field, String::new());
                    }
                },
                _ => {},
            },
            Ok(Event::Text(e)) => {
                if inside_field(&stack) {
                    let value = e
                        .unescape()
                        .map_err(|err| Error::ChainCorrupted(format!("invalid XML text: {}", err)))?;
                    text.push_str(&value);
                }
            },
            Ok(Event::CData(e)) => {
                if inside_field(&stack) {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            },
            Ok(Event::End(_)) => match stack.pop() {
                Some(Frame::Field(field)) => {
                    if let Some(item) = current.as_mut() {
                        // Only text around child elements is layout; direct text is the value.
                        let value = if wrapped { text.trim() } else { text.as_str() };
                        item.fields.insert(field, value.to_string());
                    }
                    text.clear();
                    wrapped = false;
                },
                Some(Frame::Item(true)) => {
                    if let Some(item) = current.take() {
                        descriptors.push(item.finish()?);
                    }
                },
                Some(_) => {},
                None => return Err(Error::ChainCorrupted("unbalanced XML end tag".to_string())),
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ChainCorrupted(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            },
            _ => {},
        }
    }

    if !stack.is_empty() {
        return Err(Error::ChainCorrupted("truncated signature packet".to_string()));
    }
    if !saw_bag {
        return Err(Error::ChainCorrupted("packet has no pqc:signatures bag".to_string()));
    }

    Ok(descriptors)
}

/// Decide what an opening element means given its parent frame.
fn classify(reader: &NsReader<&[u8]>, e: &BytesStart, parent: Option<Frame>) -> Frame {
    let (resolved, local) = reader.resolve_element(e.name());
    let namespace: &[u8] = match resolved {
        ResolveResult::Bound(Namespace(ns)) => ns,
        _ => b"",
    };
    let local = local.as_ref();
    let is_rdf = namespace == NS_RDF.as_bytes();

    match parent {
        _ if namespace == NS_PQC.as_bytes() && local == b"signatures" => Frame::Signatures,
        Some(Frame::Signatures) if is_rdf && (local == b"Bag" || local == b"Seq") => Frame::Bag,
        Some(Frame::Bag) if is_rdf && local == b"li" => Frame::Item(true),
        Some(Frame::Item(true)) if is_rdf && local == b"Description" => Frame::Item(false),
        Some(Frame::Item(_)) => match Field::from_name(namespace, local) {
            Some(field) => Frame::Field(field),
            None => Frame::Other,
        },
        _ => Frame::Other,
    }
}

/// Property values given as attributes, e.g. `<rdf:li pqc:order="1" ...>`.
fn read_attribute_fields(reader: &NsReader<&[u8]>, e: &BytesStart, item: &mut PartialItem) -> Result<()> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::ChainCorrupted(format!("invalid XML attribute: {}", err)))?;
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let namespace: &[u8] = match resolved {
            ResolveResult::Bound(Namespace(ns)) => ns,
            _ => continue,
        };
        if let Some(field) = Field::from_name(namespace, local.as_ref()) {
            let value = attr
                .unescape_value()
                .map_err(|err| Error::ChainCorrupted(format!("invalid XML attribute value: {}", err)))?;
            item.fields.insert(field, value.into_owned());
        }
    }
    Ok(())
}

/// Text belongs to the innermost field, including wrapped forms such as
/// `<dc:creator><rdf:Seq><rdf:li>Name</rdf:li></rdf:Seq></dc:creator>`.
fn inside_field(stack: &[Frame]) -> bool {
    for frame in stack.iter().rev() {
        match frame {
            Frame::Field(_) => return true,
            Frame::Item(_) | Frame::Bag | Frame::Signatures => return false,
            Frame::Other => {},
        }
    }
    false
}
