//! Encodes RDF statements into the fragments of an XML triples document and
//! reads generated documents back.
//!
//! A document looks like
//!
//! ```text
//! <sem:triples xmlns:sem="http://marklogic.com/semantics">
//! <sem:triple>
//! <sem:subject>http://example.org/s</sem:subject>
//! <sem:predicate>http://example.org/p</sem:predicate>
//! <sem:object datatype="http://www.w3.org/2001/XMLSchema#string">value</sem:object>
//! </sem:triple>
//! </sem:triples>
//! ```
//!
//! Blank nodes never appear as such: they are skolemized into IRIs under
//! [`BLANK_NS`] and turned back into blank nodes by [`decode_document`].

use crate::consts::{
    BLANK_NS, DATATYPE_ATTR, LANG_ATTR, OBJECT_ELEMENT, PREDICATE_ELEMENT, SEM_NS,
    SUBJECT_ELEMENT, TRIPLES_ELEMENT, TRIPLE_ELEMENT,
};
use crate::errors::{DecodeError, EncodeError};
use oxigraph::model::{
    BlankNode, BlankNodeRef, Literal, LiteralRef, NamedNode, NamedOrBlankNode,
    NamedOrBlankNodeRef, QuadRef, Term, TermRef, Triple,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Returns the IRI a blank node is rewritten to.
pub fn skolemize(node: BlankNodeRef<'_>) -> String {
    format!("{}{}", BLANK_NS, node.as_str())
}

/// Appends the opening marker of a new document.
pub fn start_document(out: &mut String) {
    out.push('<');
    out.push_str(TRIPLES_ELEMENT);
    out.push_str(" xmlns:sem=\"");
    out.push_str(SEM_NS);
    out.push_str("\">\n");
}

/// Appends the closing marker of a document.
pub fn end_document(out: &mut String) {
    out.push_str("</");
    out.push_str(TRIPLES_ELEMENT);
    out.push_str(">\n");
}

/// Encodes the subject, predicate and object of a statement. The graph name
/// is not part of the fragment; graph membership travels as document metadata.
pub fn encode_statement(statement: QuadRef<'_>) -> Result<String, EncodeError> {
    let mut out = String::with_capacity(256);
    out.push('<');
    out.push_str(TRIPLE_ELEMENT);
    out.push_str(">\n");
    push_element(&mut out, SUBJECT_ELEMENT, &subject_value(statement.subject))?;
    push_element(&mut out, PREDICATE_ELEMENT, statement.predicate.as_str())?;
    push_object(&mut out, statement.object)?;
    out.push_str("</");
    out.push_str(TRIPLE_ELEMENT);
    out.push_str(">\n");
    Ok(out)
}

fn subject_value(subject: NamedOrBlankNodeRef<'_>) -> String {
    match subject {
        NamedOrBlankNodeRef::NamedNode(node) => node.as_str().to_string(),
        NamedOrBlankNodeRef::BlankNode(node) => skolemize(node),
    }
}

#[allow(unreachable_patterns)]
fn push_object(out: &mut String, object: TermRef<'_>) -> Result<(), EncodeError> {
    match object {
        TermRef::NamedNode(node) => push_element(out, OBJECT_ELEMENT, node.as_str()),
        TermRef::BlankNode(node) => push_element(out, OBJECT_ELEMENT, &skolemize(node)),
        TermRef::Literal(literal) => push_literal(out, literal),
        other => Err(EncodeError::UnsupportedTerm(other.to_string())),
    }
}

fn push_literal(out: &mut String, literal: LiteralRef<'_>) -> Result<(), EncodeError> {
    out.push('<');
    out.push_str(OBJECT_ELEMENT);
    if let Some(language) = literal.language() {
        out.push(' ');
        out.push_str(LANG_ATTR);
        out.push_str("=\"");
        push_escaped(out, language)?;
    } else {
        // simple literals report xsd:string as their datatype
        out.push(' ');
        out.push_str(DATATYPE_ATTR);
        out.push_str("=\"");
        push_escaped(out, literal.datatype().as_str())?;
    }
    out.push_str("\">");
    push_escaped(out, literal.value())?;
    out.push_str("</");
    out.push_str(OBJECT_ELEMENT);
    out.push_str(">\n");
    Ok(())
}

fn push_element(out: &mut String, name: &str, value: &str) -> Result<(), EncodeError> {
    out.push('<');
    out.push_str(name);
    out.push('>');
    push_escaped(out, value)?;
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
    Ok(())
}

fn is_xml_char(ch: char) -> bool {
    matches!(ch,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn push_escaped(out: &mut String, value: &str) -> Result<(), EncodeError> {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // a raw CR would be normalized away by XML parsers
            '\r' => out.push_str("&#13;"),
            ch if is_xml_char(ch) => out.push(ch),
            ch => {
                return Err(EncodeError::InvalidCharacter {
                    value: value.to_string(),
                    ch,
                })
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Subject,
    Predicate,
    Object,
}

#[derive(Debug, Default)]
struct PartialTriple {
    subject: Option<String>,
    predicate: Option<String>,
    object: Option<String>,
    datatype: Option<String>,
    language: Option<String>,
}

impl PartialTriple {
    fn finish(self) -> Result<Triple, DecodeError> {
        let missing = |what: &str| DecodeError::Malformed(format!("triple without {}", what));
        let subject = self.subject.ok_or_else(|| missing("subject"))?;
        let predicate = self.predicate.ok_or_else(|| missing("predicate"))?;
        let object = self.object.ok_or_else(|| missing("object"))?;

        let subject = decode_resource(&subject)?;
        let predicate = decode_iri(&predicate)?;
        let object: Term = if let Some(language) = self.language {
            Literal::new_language_tagged_literal(object.as_str(), language.as_str())
                .map_err(|e| invalid(&language, e))?
                .into()
        } else if let Some(datatype) = self.datatype {
            Literal::new_typed_literal(object, decode_iri(&datatype)?).into()
        } else {
            match decode_resource(&object)? {
                NamedOrBlankNode::NamedNode(node) => node.into(),
                NamedOrBlankNode::BlankNode(node) => node.into(),
            }
        };
        Ok(Triple::new(subject, predicate, object))
    }
}

fn invalid(value: &str, e: impl std::fmt::Display) -> DecodeError {
    DecodeError::InvalidTerm {
        value: value.to_string(),
        reason: e.to_string(),
    }
}

fn decode_iri(value: &str) -> Result<NamedNode, DecodeError> {
    NamedNode::new(value).map_err(|e| invalid(value, e))
}

fn decode_resource(value: &str) -> Result<NamedOrBlankNode, DecodeError> {
    match value.strip_prefix(BLANK_NS) {
        Some(id) => Ok(BlankNode::new(id).map_err(|e| invalid(value, e))?.into()),
        None => Ok(decode_iri(value)?.into()),
    }
}

fn object_attributes(start: &BytesStart<'_>, triple: &mut PartialTriple) -> Result<(), DecodeError> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| DecodeError::Malformed(e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            b"datatype" => triple.datatype = Some(value),
            b"xml:lang" => triple.language = Some(value),
            _ => {}
        }
    }
    Ok(())
}

/// Reads a triples document back into the statements it holds.
///
/// Every IRI under [`BLANK_NS`] is read as a skolemized blank node, including
/// IRIs that were already in that namespace in the input. Those come back as
/// blank nodes, so decoding is only lossless for inputs that avoid the
/// namespace. Statement counts are unaffected.
pub fn decode_document(xml: &str) -> Result<Vec<Triple>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut triples = Vec::new();
    let mut current: Option<PartialTriple> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();
    let mut seen_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(start) => match start.name().as_ref() {
                b"sem:triples" => seen_root = true,
                b"sem:triple" => current = Some(PartialTriple::default()),
                name => {
                    let triple = current
                        .as_mut()
                        .ok_or_else(|| DecodeError::Malformed("term outside of a triple".into()))?;
                    field = Some(match name {
                        b"sem:subject" => Field::Subject,
                        b"sem:predicate" => Field::Predicate,
                        b"sem:object" => {
                            object_attributes(&start, triple)?;
                            Field::Object
                        }
                        other => {
                            return Err(DecodeError::Malformed(format!(
                                "unexpected element {}",
                                String::from_utf8_lossy(other)
                            )))
                        }
                    });
                    text.clear();
                }
            },
            Event::Empty(start) if start.name().as_ref() == b"sem:object" => {
                // an empty literal may be written as a self-closing element
                let triple = current
                    .as_mut()
                    .ok_or_else(|| DecodeError::Malformed("term outside of a triple".into()))?;
                object_attributes(&start, triple)?;
                triple.object = Some(String::new());
            }
            Event::Text(t) => {
                if field.is_some() {
                    let value = t
                        .unescape()
                        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
                    text.push_str(&value);
                }
            }
            Event::End(end) => match end.name().as_ref() {
                b"sem:triple" => {
                    let triple = current
                        .take()
                        .ok_or_else(|| DecodeError::Malformed("unbalanced triple".into()))?;
                    triples.push(triple.finish()?);
                }
                b"sem:triples" => {}
                _ => {
                    if let (Some(f), Some(triple)) = (field.take(), current.as_mut()) {
                        let value = std::mem::take(&mut text);
                        match f {
                            Field::Subject => triple.subject = Some(value),
                            Field::Predicate => triple.predicate = Some(value),
                            Field::Object => triple.object = Some(value),
                        }
                    }
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(DecodeError::Malformed(format!(
            "missing {} root element",
            TRIPLES_ELEMENT
        )));
    }
    Ok(triples)
}
