//! Well-known IRIs and names shared by the encoder, the router and the stores.

use oxigraph::model::NamedNodeRef;

/// Graph identifier given to statements that carry no explicit context.
pub const DEFAULT_GRAPH: &str = "http://marklogic.com/semantics#default-graph";

/// Namespace of the `sem:` elements in generated documents.
pub const SEM_NS: &str = "http://marklogic.com/semantics";

/// Blank nodes are rewritten to IRIs under this namespace.
pub const BLANK_NS: &str = "http://marklogic.com/semantics/blank/";

pub const XSD_STRING: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2001/XMLSchema#string");

/// Default prefix of generated document URIs.
pub const DOCUMENT_PREFIX: &str = "/triplestore/";

/// Base IRI used when a reader is ingested without one.
pub const DEFAULT_BASE_IRI: &str = "http://example.org/";

// element and attribute names of the triples document grammar
pub const TRIPLES_ELEMENT: &str = "sem:triples";
pub const TRIPLE_ELEMENT: &str = "sem:triple";
pub const SUBJECT_ELEMENT: &str = "sem:subject";
pub const PREDICATE_ELEMENT: &str = "sem:predicate";
pub const OBJECT_ELEMENT: &str = "sem:object";
pub const DATATYPE_ATTR: &str = "datatype";
pub const LANG_ATTR: &str = "xml:lang";
