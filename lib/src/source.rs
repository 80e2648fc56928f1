//! Statement sources: a streaming RDF parser, or any in-memory sequence of
//! quads. A source drives a [`StatementHandler`] from a single thread,
//! calling `start`, then `handle_statement` once per statement, then `end`.

use crate::errors::IngestError;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::Quad;
use std::io::Read;
use std::path::Path;

pub trait StatementHandler {
    fn start(&mut self) -> Result<(), IngestError> {
        Ok(())
    }

    fn handle_statement(&mut self, statement: Quad) -> Result<(), IngestError>;

    fn end(&mut self) -> Result<(), IngestError> {
        Ok(())
    }
}

pub trait StatementSource {
    /// Whether statements may carry their own graph context.
    fn supports_contexts(&self) -> bool;

    /// Feeds every statement to `handler`. Stops at the first error, whether
    /// it comes from the input or from the handler.
    fn run(self, handler: &mut dyn StatementHandler) -> Result<(), IngestError>
    where
        Self: Sized;
}

/// Streams statements out of an RDF document with oxigraph's parsers.
pub struct ParserSource<R> {
    format: RdfFormat,
    parser: RdfParser,
    reader: R,
}

impl<R: Read> ParserSource<R> {
    pub fn new(reader: R, format: RdfFormat, base_iri: Option<&str>) -> Result<Self, IngestError> {
        let mut parser = RdfParser::from_format(format);
        if let Some(base) = base_iri {
            parser = parser
                .with_base_iri(base)
                .map_err(|e| IngestError::Config(format!("invalid base IRI <{}>: {}", base, e)))?;
        }
        Ok(ParserSource {
            format,
            parser,
            reader,
        })
    }
}

impl<R: Read> StatementSource for ParserSource<R> {
    fn supports_contexts(&self) -> bool {
        self.format.supports_datasets()
    }

    fn run(self, handler: &mut dyn StatementHandler) -> Result<(), IngestError> {
        handler.start()?;
        for quad in self.parser.for_reader(self.reader) {
            handler.handle_statement(quad?)?;
        }
        handler.end()
    }
}

/// Serves statements from an in-memory sequence.
pub struct QuadSource<I> {
    quads: I,
    supports_contexts: bool,
}

impl<I: IntoIterator<Item = Quad>> QuadSource<I> {
    /// Behaves like a triple format: contexts of the quads are not used.
    pub fn triples(quads: I) -> Self {
        QuadSource {
            quads,
            supports_contexts: false,
        }
    }

    /// Behaves like a quad format: each quad keeps its own context.
    pub fn quads(quads: I) -> Self {
        QuadSource {
            quads,
            supports_contexts: true,
        }
    }
}

impl<I: IntoIterator<Item = Quad>> StatementSource for QuadSource<I> {
    fn supports_contexts(&self) -> bool {
        self.supports_contexts
    }

    fn run(self, handler: &mut dyn StatementHandler) -> Result<(), IngestError> {
        handler.start()?;
        for quad in self.quads {
            handler.handle_statement(quad)?;
        }
        handler.end()
    }
}

/// File extensions accepted as RDF input. `RdfFormat::from_extension` also
/// maps generic ones like `txt` and `json`, which are not taken as RDF here.
const RDF_EXTENSIONS: &[&str] = &[
    "nt", "nq", "ttl", "trig", "n3", "rdf", "owl", "xml", "jsonld",
];

fn format_from_extension(ext: &str) -> Option<RdfFormat> {
    let ext = ext.to_ascii_lowercase();
    if !RDF_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    match ext.as_str() {
        "owl" | "xml" => Some(RdfFormat::RdfXml),
        other => RdfFormat::from_extension(other),
    }
}

/// Picks the parser for a file from its extension.
pub fn format_from_path(path: &Path) -> Result<RdfFormat, IngestError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(format_from_extension)
        .ok_or_else(|| IngestError::UnsupportedFormat(path.display().to_string()))
}

/// Resolves a format given as file extension (`ttl`, `nq`) or media type
/// (`text/turtle`).
pub fn format_from_name(name: &str) -> Result<RdfFormat, IngestError> {
    let format = if name.contains('/') {
        RdfFormat::from_media_type(name)
    } else {
        format_from_extension(name)
    };
    format.ok_or_else(|| IngestError::UnsupportedFormat(name.to_string()))
}
