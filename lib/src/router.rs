//! Graph resolution: decides which graph(s) every incoming statement is
//! written into. One router is built per ingest call, according to the
//! capabilities of the input format and the caller's override graphs, and
//! the choice never changes while the stream is consumed.

use crate::consts::DEFAULT_GRAPH;
use crate::encoder::skolemize;
use crate::errors::IngestError;
use oxigraph::model::{GraphName, GraphNameRef, QuadRef};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IngestMode {
    /// The format carries no contexts and no override graphs were given.
    Triple,
    /// The format carries a context per statement.
    Quad,
    /// The caller supplied override graphs.
    Context,
}

impl IngestMode {
    pub fn select(supports_contexts: bool, overrides: &[GraphName]) -> Self {
        if !overrides.is_empty() {
            IngestMode::Context
        } else if supports_contexts {
            IngestMode::Quad
        } else {
            IngestMode::Triple
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IngestMode::Triple => write!(f, "triple"),
            IngestMode::Quad => write!(f, "quad"),
            IngestMode::Context => write!(f, "supplied-context"),
        }
    }
}

/// Returns the graph identifier used as partition key for a graph name.
pub fn graph_identifier(graph: GraphNameRef<'_>) -> String {
    match graph {
        GraphNameRef::NamedNode(node) => node.as_str().to_string(),
        GraphNameRef::BlankNode(node) => skolemize(node),
        GraphNameRef::DefaultGraph => DEFAULT_GRAPH.to_string(),
    }
}

pub trait StatementRouter {
    fn mode(&self) -> IngestMode;

    /// Returns the graph identifiers the statement must be written into.
    fn targets<'a>(&'a self, statement: QuadRef<'a>) -> Vec<Cow<'a, str>>;
}

/// Sends every statement to the default graph.
#[derive(Debug, Default)]
pub struct TripleRouter;

impl StatementRouter for TripleRouter {
    fn mode(&self) -> IngestMode {
        IngestMode::Triple
    }

    fn targets<'a>(&'a self, _statement: QuadRef<'a>) -> Vec<Cow<'a, str>> {
        vec![Cow::Borrowed(DEFAULT_GRAPH)]
    }
}

/// Sends every statement to its own context, or the default graph if it has none.
#[derive(Debug, Default)]
pub struct QuadRouter;

impl StatementRouter for QuadRouter {
    fn mode(&self) -> IngestMode {
        IngestMode::Quad
    }

    fn targets<'a>(&'a self, statement: QuadRef<'a>) -> Vec<Cow<'a, str>> {
        let target = match statement.graph_name {
            GraphNameRef::NamedNode(node) => Cow::Borrowed(node.as_str()),
            GraphNameRef::BlankNode(node) => Cow::Owned(skolemize(node)),
            GraphNameRef::DefaultGraph => Cow::Borrowed(DEFAULT_GRAPH),
        };
        vec![target]
    }
}

/// Fans every statement out into each of the caller's override graphs,
/// ignoring whatever context the statement carries.
#[derive(Debug)]
pub struct ContextRouter {
    graphs: Vec<String>,
}

impl ContextRouter {
    pub fn new(overrides: &[GraphName]) -> Result<Self, IngestError> {
        if overrides.is_empty() {
            return Err(IngestError::Config(
                "supplied-context ingest needs at least one graph".to_string(),
            ));
        }
        let mut graphs: Vec<String> = Vec::with_capacity(overrides.len());
        for graph in overrides {
            let id = graph_identifier(graph.as_ref());
            if !graphs.contains(&id) {
                graphs.push(id);
            }
        }
        Ok(Self { graphs })
    }

    pub fn graphs(&self) -> &[String] {
        &self.graphs
    }
}

impl StatementRouter for ContextRouter {
    fn mode(&self) -> IngestMode {
        IngestMode::Context
    }

    fn targets<'a>(&'a self, _statement: QuadRef<'a>) -> Vec<Cow<'a, str>> {
        self.graphs.iter().map(|g| Cow::Borrowed(g.as_str())).collect()
    }
}

/// Builds the router for an ingest call.
pub fn router_for(
    supports_contexts: bool,
    overrides: &[GraphName],
) -> Result<Box<dyn StatementRouter>, IngestError> {
    Ok(match IngestMode::select(supports_contexts, overrides) {
        IngestMode::Triple => Box::new(TripleRouter),
        IngestMode::Quad => Box::new(QuadRouter),
        IngestMode::Context => Box::new(ContextRouter::new(overrides)?),
    })
}
