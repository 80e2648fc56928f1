//! Error types surfaced by the ingest pipeline.
//!
//! The variants follow the failure classes of an ingest call: configuration
//! problems and unsupported formats are rejected before any parsing starts,
//! parse and encode failures abort the consumer immediately, and write
//! failures are collected from the worker pool and reported once every task
//! has been joined.

use oxigraph::io::RdfParseError;
use std::fmt;
use std::path::PathBuf;

/// A statement could not be turned into a document fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The value holds a character that XML 1.0 documents cannot carry.
    InvalidCharacter { value: String, ch: char },
    /// The term kind has no representation in the triples grammar.
    UnsupportedTerm(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::InvalidCharacter { value, ch } => write!(
                f,
                "character U+{:04X} cannot be written to a document (in {:?})",
                *ch as u32, value
            ),
            EncodeError::UnsupportedTerm(term) => {
                write!(f, "term {} cannot be written to a document", term)
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// A generated document could not be read back.
#[derive(Debug)]
pub enum DecodeError {
    Xml(quick_xml::Error),
    /// The document does not follow the triples grammar.
    Malformed(String),
    /// A subject, predicate, datatype or language tag failed validation.
    InvalidTerm { value: String, reason: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Xml(e) => write!(f, "{}", e),
            DecodeError::Malformed(m) => write!(f, "malformed triples document: {}", m),
            DecodeError::InvalidTerm { value, reason } => {
                write!(f, "invalid term {:?}: {}", value, reason)
            }
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Xml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for DecodeError {
    fn from(e: quick_xml::Error) -> Self {
        DecodeError::Xml(e)
    }
}

/// Failure of a whole ingest call.
#[derive(Debug)]
pub enum IngestError {
    /// The input format is not an RDF serialization we can parse.
    UnsupportedFormat(String),
    /// Limits, override graphs or base IRI are unusable.
    Config(String),
    /// An input file could not be opened.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The statement source reported malformed input.
    Parse(RdfParseError),
    Encode(EncodeError),
    /// The first write task (in submission order) that failed.
    Write { task: usize, source: anyhow::Error },
    /// The worker pool could not be started or lost a worker.
    Dispatch(String),
}

impl IngestError {
    pub fn is_parse(&self) -> bool {
        matches!(self, IngestError::Parse(_))
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::UnsupportedFormat(name) => write!(f, "unsupported RDF format: {}", name),
            IngestError::Config(m) => write!(f, "invalid ingest configuration: {}", m),
            IngestError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            IngestError::Parse(e) => write!(f, "failed to parse statements: {}", e),
            IngestError::Encode(e) => write!(f, "failed to encode statement: {}", e),
            IngestError::Write { task, source } => {
                write!(f, "write task {} failed: {:#}", task, source)
            }
            IngestError::Dispatch(m) => write!(f, "write dispatch failed: {}", m),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io { source, .. } => Some(source),
            IngestError::Parse(e) => Some(e),
            IngestError::Encode(e) => Some(e),
            IngestError::Write { source, .. } => {
                let source: &(dyn std::error::Error + 'static) = source.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}

impl From<RdfParseError> for IngestError {
    fn from(e: RdfParseError) -> Self {
        IngestError::Parse(e)
    }
}

impl From<EncodeError> for IngestError {
    fn from(e: EncodeError) -> Self {
        IngestError::Encode(e)
    }
}
