//! Per-graph accumulation of encoded statements.
//!
//! Every graph has at most one open [`DocumentBuffer`]. Buffers are only
//! touched by the thread consuming the statement stream; once a buffer is
//! full it is handed to the [`DocumentBatcher`] and never seen again here.

use crate::batcher::DocumentBatcher;
use crate::dispatch::Task;
use crate::encoder::{end_document, start_document};
use std::collections::HashMap;

/// An open document for one graph.
#[derive(Debug)]
pub struct DocumentBuffer {
    text: String,
    statements: usize,
}

impl DocumentBuffer {
    fn open() -> Self {
        let mut text = String::with_capacity(4096);
        start_document(&mut text);
        DocumentBuffer {
            text,
            statements: 0,
        }
    }

    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.statements += 1;
    }

    pub fn statements(&self) -> usize {
        self.statements
    }

    /// Writes the closing marker and returns the document text with its
    /// statement count.
    pub fn finish(mut self) -> (String, usize) {
        end_document(&mut self.text);
        (self.text, self.statements)
    }
}

#[derive(Debug)]
pub struct PartitionTracker {
    statements_per_document: usize,
    buffers: HashMap<String, DocumentBuffer>,
}

impl PartitionTracker {
    pub fn new(statements_per_document: usize) -> Self {
        PartitionTracker {
            statements_per_document: statements_per_document.max(1),
            buffers: HashMap::new(),
        }
    }

    /// Appends an encoded statement to the open document of `graph`. When
    /// that document is already full it is closed first and a fresh one is
    /// opened; if closing it completes a batch, the resulting task is
    /// returned for dispatch.
    pub fn route(
        &mut self,
        graph: &str,
        fragment: &str,
        batcher: &mut DocumentBatcher,
    ) -> Option<Task> {
        let full = self
            .buffers
            .get(graph)
            .is_some_and(|b| b.statements >= self.statements_per_document);
        let ready = if full { self.close(graph, batcher) } else { None };

        if !self.buffers.contains_key(graph) {
            self.buffers.insert(graph.to_string(), DocumentBuffer::open());
        }
        if let Some(buffer) = self.buffers.get_mut(graph) {
            buffer.push(fragment);
        }
        ready
    }

    /// Closes the open document of `graph`, if any, through the batcher.
    pub fn close(&mut self, graph: &str, batcher: &mut DocumentBatcher) -> Option<Task> {
        let buffer = self.buffers.remove(graph)?;
        batcher.close(graph.to_string(), buffer)
    }

    /// Graphs with an open document, in sorted order.
    pub fn open_graphs(&self) -> Vec<String> {
        let mut graphs: Vec<String> = self.buffers.keys().cloned().collect();
        graphs.sort();
        graphs
    }

    pub fn open_statements(&self, graph: &str) -> Option<usize> {
        self.buffers.get(graph).map(DocumentBuffer::statements)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(n: usize) -> String {
        format!("<sem:triple>{}</sem:triple>\n", n)
    }

    #[test]
    fn test_rollover_at_limit() {
        let mut tracker = PartitionTracker::new(3);
        let mut batcher = DocumentBatcher::new(100, "/t/");
        for n in 0..7 {
            assert!(tracker.route("g", &fragment(n), &mut batcher).is_none());
        }
        // 3 + 3 closed, 1 still open
        assert_eq!(batcher.pending_documents(), 2);
        assert_eq!(tracker.open_statements("g"), Some(1));
    }

    #[test]
    fn test_graphs_do_not_mix() {
        let mut tracker = PartitionTracker::new(2);
        let mut batcher = DocumentBatcher::new(100, "/t/");
        for n in 0..5 {
            tracker.route("a", &fragment(n), &mut batcher);
            tracker.route("b", &fragment(n + 100), &mut batcher);
        }
        let tasks = batcher.flush(&mut tracker);
        assert!(tracker.is_empty());
        assert_eq!(tasks.len(), 1);
        for entry in tasks[0].write_set.iter() {
            let foreign = if entry.graph == "a" { "<sem:triple>10" } else { "<sem:triple>0<" };
            assert!(!entry.content.contains(foreign), "{:?}", entry);
            assert!(entry.statements <= 2);
        }
        assert_eq!(tasks[0].write_set.statements(), 10);
    }

    #[test]
    fn test_buffer_document_markers() {
        let mut buffer = DocumentBuffer::open();
        buffer.push(&fragment(1));
        let (text, count) = buffer.finish();
        assert_eq!(count, 1);
        assert!(text.starts_with("<sem:triples xmlns:sem=\"http://marklogic.com/semantics\">"));
        assert!(text.ends_with("</sem:triples>\n"));
    }
}
