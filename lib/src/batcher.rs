//! Turns closed document buffers into write-set entries and groups them into
//! bounded write-sets, remembering which graphs were seen for the first time
//! so that each batch can make sure its graphs exist in the store.

use crate::dispatch::Task;
use crate::partition::{DocumentBuffer, PartitionTracker};
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// One generated document, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    /// Generated document URI.
    pub uri: String,
    /// Graph the document belongs to; stored as collection metadata.
    pub graph: String,
    pub content: String,
    pub statements: usize,
}

/// A batch of documents written together by one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    entries: Vec<DocumentEntry>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: DocumentEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentEntry> {
        self.entries.iter()
    }

    /// Total number of statements over all documents.
    pub fn statements(&self) -> usize {
        self.entries.iter().map(|e| e.statements).sum()
    }
}

impl<'a> IntoIterator for &'a WriteSet {
    type Item = &'a DocumentEntry;
    type IntoIter = std::slice::Iter<'a, DocumentEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<DocumentEntry> for WriteSet {
    fn from_iter<I: IntoIterator<Item = DocumentEntry>>(iter: I) -> Self {
        WriteSet {
            entries: iter.into_iter().collect(),
        }
    }
}

/// The distinct graphs observed during one ingest call.
#[derive(Debug, Default)]
pub struct GraphRegistry {
    seen: HashSet<String>,
    order: Vec<String>,
}

impl GraphRegistry {
    /// Records `graph`; returns true the first time a graph is seen.
    pub fn record(&mut self, graph: &str) -> bool {
        if self.seen.contains(graph) {
            return false;
        }
        self.seen.insert(graph.to_string());
        self.order.push(graph.to_string());
        true
    }

    /// Graphs in the order they were first seen.
    pub fn graphs(&self) -> &[String] {
        &self.order
    }
}

#[derive(Debug)]
pub struct DocumentBatcher {
    documents_per_batch: usize,
    document_prefix: String,
    write_set: WriteSet,
    new_graphs: Vec<String>,
    registry: GraphRegistry,
    documents: usize,
}

impl DocumentBatcher {
    pub fn new(documents_per_batch: usize, document_prefix: impl Into<String>) -> Self {
        DocumentBatcher {
            documents_per_batch: documents_per_batch.max(1),
            document_prefix: document_prefix.into(),
            write_set: WriteSet::new(),
            new_graphs: Vec::new(),
            registry: GraphRegistry::default(),
            documents: 0,
        }
    }

    /// Finalizes a graph's buffer into an entry of the current write-set.
    /// Returns a task once the write-set reaches the batch limit.
    pub fn close(&mut self, graph: String, buffer: DocumentBuffer) -> Option<Task> {
        let (content, statements) = buffer.finish();
        let uri = format!("{}{}.xml", self.document_prefix, Uuid::new_v4());
        if self.registry.record(&graph) {
            self.new_graphs.push(graph.clone());
        }
        trace!("Closed document {} ({} statements) in <{}>", uri, statements, graph);
        self.write_set.push(DocumentEntry {
            uri,
            graph,
            content,
            statements,
        });
        self.documents += 1;

        if self.write_set.len() >= self.documents_per_batch {
            Some(self.take_task())
        } else {
            None
        }
    }

    fn take_task(&mut self) -> Task {
        Task::new(
            std::mem::take(&mut self.write_set),
            std::mem::take(&mut self.new_graphs),
        )
    }

    /// Closes every open buffer of `tracker` (sorted by graph) and returns
    /// the tasks still to dispatch, the last one holding the partial batch
    /// and the graphs first seen in it.
    pub fn flush(&mut self, tracker: &mut PartitionTracker) -> Vec<Task> {
        let mut tasks = Vec::new();
        for graph in tracker.open_graphs() {
            if let Some(task) = tracker.close(&graph, self) {
                tasks.push(task);
            }
        }
        if !self.write_set.is_empty() || !self.new_graphs.is_empty() {
            tasks.push(self.take_task());
        }
        tasks
    }

    /// Documents waiting in the current, not yet dispatched write-set.
    pub fn pending_documents(&self) -> usize {
        self.write_set.len()
    }

    /// Documents closed so far.
    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn registry(&self) -> &GraphRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_n(
        tracker: &mut PartitionTracker,
        batcher: &mut DocumentBatcher,
        graph: &str,
        n: usize,
    ) -> Vec<Task> {
        (0..n)
            .filter_map(|i| {
                let fragment = format!("<sem:triple>{}</sem:triple>\n", i);
                tracker.route(graph, &fragment, batcher)
            })
            .collect()
    }

    #[test]
    fn test_batch_reaches_limit() {
        let mut tracker = PartitionTracker::new(2);
        let mut batcher = DocumentBatcher::new(3, "/triplestore/");
        // 7 statements -> docs close on the 3rd, 5th and 7th statement
        let tasks = route_n(&mut tracker, &mut batcher, "g", 7);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].write_set.len(), 3);
        assert_eq!(tasks[0].new_graphs, vec!["g".to_string()]);
        assert_eq!(batcher.pending_documents(), 0);

        let rest = batcher.flush(&mut tracker);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].write_set.len(), 1);
        assert!(rest[0].new_graphs.is_empty());
    }

    #[test]
    fn test_flush_when_batch_boundary_meets_stream_end() {
        let mut tracker = PartitionTracker::new(2);
        let mut batcher = DocumentBatcher::new(2, "/triplestore/");
        // 2 docs in total, the second only closes at flush and completes the batch
        let tasks = route_n(&mut tracker, &mut batcher, "g", 4);
        assert!(tasks.is_empty());
        let tasks = batcher.flush(&mut tracker);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].write_set.len(), 2);
        assert_eq!(tasks[0].write_set.statements(), 4);
        assert_eq!(tasks[0].new_graphs, vec!["g".to_string()]);
    }

    #[test]
    fn test_flush_with_nothing_open() {
        let mut tracker = PartitionTracker::new(2);
        let mut batcher = DocumentBatcher::new(2, "/triplestore/");
        assert!(batcher.flush(&mut tracker).is_empty());
    }

    #[test]
    fn test_document_names_are_unique() {
        let mut tracker = PartitionTracker::new(1);
        let mut batcher = DocumentBatcher::new(100, "/docs/");
        route_n(&mut tracker, &mut batcher, "g", 10);
        let tasks = batcher.flush(&mut tracker);
        let uris: HashSet<&str> = tasks[0].write_set.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris.len(), 10);
        assert!(uris.iter().all(|u| u.starts_with("/docs/") && u.ends_with(".xml")));
    }

    #[test]
    fn test_registry_records_once() {
        let mut registry = GraphRegistry::default();
        assert!(registry.record("a"));
        assert!(registry.record("b"));
        assert!(!registry.record("a"));
        assert_eq!(registry.graphs(), &["a".to_string(), "b".to_string()]);
    }
}
