//! The ingest orchestrator: drives a statement source on the calling
//! thread, partitions and batches the encoded statements, hands finished
//! write-sets to the worker pool and joins it before returning.

use crate::batcher::DocumentBatcher;
use crate::config::IngestConfig;
use crate::consts::DEFAULT_BASE_IRI;
use crate::dispatch::{Dispatcher, Task, TaskHandle};
use crate::encoder::encode_statement;
use crate::errors::IngestError;
use crate::partition::PartitionTracker;
use crate::router::{router_for, IngestMode, StatementRouter};
use crate::source::{format_from_path, ParserSource, StatementHandler, StatementSource};
use crate::store::{DocumentStore, Transaction};
use log::{info, warn};
use oxigraph::io::RdfFormat;
use oxigraph::model::{GraphName, Quad};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

/// Summary of a successful ingest call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub mode: IngestMode,
    /// Statements consumed from the source.
    pub statements: usize,
    /// Documents written; larger than `statements / limit` when statements
    /// fan out into several graphs.
    pub documents: usize,
    /// Write tasks dispatched.
    pub tasks: usize,
    /// Distinct graphs, in the order they were first written.
    pub graphs: Vec<String>,
}

struct Pipeline<'d, 'scope> {
    router: Box<dyn StatementRouter>,
    tracker: PartitionTracker,
    batcher: DocumentBatcher,
    dispatcher: &'d mut Dispatcher<'scope>,
    handles: Vec<TaskHandle>,
    statements: usize,
}

impl Pipeline<'_, '_> {
    fn submit(
        dispatcher: &mut Dispatcher<'_>,
        handles: &mut Vec<TaskHandle>,
        task: Task,
    ) -> Result<(), IngestError> {
        handles.push(dispatcher.submit(task)?);
        Ok(())
    }
}

impl StatementHandler for Pipeline<'_, '_> {
    fn handle_statement(&mut self, statement: Quad) -> Result<(), IngestError> {
        let fragment = encode_statement(statement.as_ref())?;
        self.statements += 1;
        for graph in self.router.targets(statement.as_ref()) {
            if let Some(task) = self.tracker.route(&graph, &fragment, &mut self.batcher) {
                Self::submit(self.dispatcher, &mut self.handles, task)?;
            }
        }
        Ok(())
    }

    fn end(&mut self) -> Result<(), IngestError> {
        for task in self.batcher.flush(&mut self.tracker) {
            Self::submit(self.dispatcher, &mut self.handles, task)?;
        }
        Ok(())
    }
}

/// Ingests every statement of `source` into `store` under `tx`.
///
/// When `overrides` is non-empty every statement is written into each of
/// those graphs; otherwise statements go to their own context (quad
/// formats) or to the default graph. The call returns only after every
/// dispatched write has finished. On failure the transaction may already
/// hold some of the writes and should be rolled back by the caller.
pub fn ingest<Src, S>(
    source: Src,
    store: &S,
    tx: &Transaction,
    overrides: &[GraphName],
    config: &IngestConfig,
) -> Result<IngestReport, IngestError>
where
    Src: StatementSource,
    S: DocumentStore + ?Sized,
{
    config.validate()?;
    let router = router_for(source.supports_contexts(), overrides)?;
    let mode = router.mode();
    let limits = *config.limits(mode);
    let started = Instant::now();
    info!(
        "Ingesting in {} mode into transaction {} ({} statements/document, {} documents/batch, {} writers)",
        mode, tx, limits.statements_per_document, limits.documents_per_batch, limits.worker_threads
    );

    std::thread::scope(|scope| {
        let mut dispatcher = Dispatcher::start(
            scope,
            store,
            tx,
            limits.worker_threads,
            config.queue_depth,
            limits.max_graphs_per_request,
        )?;
        let mut pipeline = Pipeline {
            router,
            tracker: PartitionTracker::new(limits.statements_per_document),
            batcher: DocumentBatcher::new(limits.documents_per_batch, config.document_prefix.clone()),
            dispatcher: &mut dispatcher,
            handles: Vec::new(),
            statements: 0,
        };
        let consumed = source.run(&mut pipeline);
        let Pipeline {
            batcher,
            handles,
            statements,
            ..
        } = pipeline;

        if let Err(e) = consumed {
            warn!(
                "Ingest aborted after {} statements; waiting for {} submitted task(s): {}",
                statements,
                handles.len(),
                e
            );
            dispatcher.abandon(handles);
            return Err(e);
        }

        let tasks = handles.len();
        dispatcher.join_all(handles)?;
        let report = IngestReport {
            mode,
            statements,
            documents: batcher.documents(),
            tasks,
            graphs: batcher.registry().graphs().to_vec(),
        };
        info!(
            "Ingested {} statements as {} documents in {} graph(s) with {} task(s) in {:?}",
            report.statements,
            report.documents,
            report.graphs.len(),
            report.tasks,
            started.elapsed()
        );
        Ok(report)
    })
}

/// Ingest entry points bound to one store and configuration.
pub struct Ingester<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    config: &'a IngestConfig,
}

impl<'a, S: DocumentStore + ?Sized> Ingester<'a, S> {
    pub fn new(store: &'a S, config: &'a IngestConfig) -> Self {
        Ingester { store, config }
    }

    pub fn ingest<Src: StatementSource>(
        &self,
        source: Src,
        tx: &Transaction,
        overrides: &[GraphName],
    ) -> Result<IngestReport, IngestError> {
        ingest(source, self.store, tx, overrides, self.config)
    }

    /// Parses `reader` as `format`. Relative IRIs resolve against
    /// `base_iri`, or `http://example.org/` when none is given.
    pub fn ingest_reader<R: Read>(
        &self,
        reader: R,
        format: RdfFormat,
        base_iri: Option<&str>,
        tx: &Transaction,
        overrides: &[GraphName],
    ) -> Result<IngestReport, IngestError> {
        let source = ParserSource::new(reader, format, Some(base_iri.unwrap_or(DEFAULT_BASE_IRI)))?;
        self.ingest(source, tx, overrides)
    }

    /// Parses the file at `path`. The format comes from the extension unless
    /// given, and relative IRIs resolve against the file's own URI unless a
    /// base IRI is given.
    pub fn ingest_file(
        &self,
        path: &Path,
        format: Option<RdfFormat>,
        base_iri: Option<&str>,
        tx: &Transaction,
        overrides: &[GraphName],
    ) -> Result<IngestReport, IngestError> {
        let format = match format {
            Some(format) => format,
            None => format_from_path(path)?,
        };
        let base = match base_iri {
            Some(base) => base.to_string(),
            None => file_base_iri(path),
        };
        let file = File::open(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Reading {} as {}", path.display(), format);
        let source = ParserSource::new(BufReader::new(file), format, Some(&base))?;
        self.ingest(source, tx, overrides)
    }
}

fn file_base_iri(path: &Path) -> String {
    std::fs::canonicalize(path)
        .ok()
        .and_then(|abs| url::Url::from_file_path(abs).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| DEFAULT_BASE_IRI.to_string())
}
