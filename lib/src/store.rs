//! The document store collaborator: the trait the ingest pipeline writes
//! through, the transaction handle shared by all tasks of an ingest call,
//! and two implementations (in-memory and directory backed).

use crate::batcher::WriteSet;
use anyhow::{anyhow, bail, Context, Result};
use chrono::prelude::*;
use fs2::FileExt;
use log::{debug, info};
use oxigraph::model::NamedNode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use walkdir::WalkDir;

/// Handle of an open store transaction. Tasks only read it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    id: String,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

pub trait DocumentStore: Send + Sync {
    /// Durably writes every document of the write-set under `tx`. Writing
    /// the same write-set twice must leave the same state.
    fn write(&self, write_set: &WriteSet, tx: &Transaction) -> Result<()>;

    /// Makes sure each graph has an existence record, creating the missing
    /// ones. Idempotent.
    fn ensure_graphs_exist(&self, graphs: &[String], tx: &Transaction) -> Result<()>;
}

fn check_graph_iri(graph: &str) -> Result<()> {
    NamedNode::new(graph)
        .map(|_| ())
        .map_err(|e| anyhow!("invalid graph IRI <{}>: {}", graph, e))
}

/// A stored document and the graph it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub graph: String,
    pub content: String,
}

#[derive(Debug, Default)]
struct Staged {
    documents: BTreeMap<String, StoredDocument>,
    graphs: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: BTreeMap<String, StoredDocument>,
    graphs: BTreeSet<String>,
    open: HashMap<String, Staged>,
    write_calls: usize,
    graph_requests: Vec<Vec<String>>,
}

/// Keeps documents in memory. Writes are staged per transaction and only
/// become visible through [`MemoryStore::documents`] after commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn begin(&self) -> Transaction {
        let tx = Transaction::new();
        self.state().open.insert(tx.id().to_string(), Staged::default());
        tx
    }

    pub fn commit(&self, tx: &Transaction) -> Result<()> {
        let mut state = self.state();
        let staged = state
            .open
            .remove(tx.id())
            .ok_or_else(|| anyhow!("transaction {} is not open", tx))?;
        state.documents.extend(staged.documents);
        state.graphs.extend(staged.graphs);
        Ok(())
    }

    pub fn rollback(&self, tx: &Transaction) -> Result<()> {
        self.state()
            .open
            .remove(tx.id())
            .map(|_| ())
            .ok_or_else(|| anyhow!("transaction {} is not open", tx))
    }

    /// Committed documents keyed by URI.
    pub fn documents(&self) -> BTreeMap<String, StoredDocument> {
        self.state().documents.clone()
    }

    /// Documents written under a still open transaction.
    pub fn staged_documents(&self, tx: &Transaction) -> BTreeMap<String, StoredDocument> {
        self.state()
            .open
            .get(tx.id())
            .map(|s| s.documents.clone())
            .unwrap_or_default()
    }

    /// Committed graph existence records.
    pub fn graphs(&self) -> Vec<String> {
        self.state().graphs.iter().cloned().collect()
    }

    /// Number of `write` calls received, committed or not.
    pub fn write_calls(&self) -> usize {
        self.state().write_calls
    }

    /// Graph lists of every `ensure_graphs_exist` call, in arrival order.
    pub fn graph_requests(&self) -> Vec<Vec<String>> {
        self.state().graph_requests.clone()
    }
}

impl DocumentStore for MemoryStore {
    fn write(&self, write_set: &WriteSet, tx: &Transaction) -> Result<()> {
        let mut state = self.state();
        state.write_calls += 1;
        let staged = state
            .open
            .get_mut(tx.id())
            .ok_or_else(|| anyhow!("transaction {} is not open", tx))?;
        for entry in write_set {
            staged.documents.insert(
                entry.uri.clone(),
                StoredDocument {
                    graph: entry.graph.clone(),
                    content: entry.content.clone(),
                },
            );
        }
        Ok(())
    }

    fn ensure_graphs_exist(&self, graphs: &[String], tx: &Transaction) -> Result<()> {
        for graph in graphs {
            check_graph_iri(graph)?;
        }
        let mut state = self.state();
        state.graph_requests.push(graphs.to_vec());
        let staged = state
            .open
            .get_mut(tx.id())
            .ok_or_else(|| anyhow!("transaction {} is not open", tx))?;
        staged.graphs.extend(graphs.iter().cloned());
        Ok(())
    }
}

/// Metadata written next to every document of a [`DirectoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub uri: String,
    pub graph: String,
    pub statements: usize,
    pub written: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphRecord {
    graph: String,
    created: DateTime<Utc>,
}

const DOCUMENTS_DIR: &str = "documents";
const GRAPHS_DIR: &str = "graphs";
const STAGING_DIR: &str = ".staging";
const LOCK_FILE: &str = ".lock";
const META_SUFFIX: &str = ".meta.json";

/// Stores documents as files below a root directory:
///
/// - `documents/<uri>` holds the document, `documents/<uri>.meta.json` its
///   [`DocumentRecord`]
/// - `graphs/<blake3 of the graph IRI>.json` is the graph existence record
/// - `.staging/<transaction>/` mirrors that layout for uncommitted writes
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(DOCUMENTS_DIR))?;
        std::fs::create_dir_all(root.join(GRAPHS_DIR))?;
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging(&self, tx: &Transaction) -> PathBuf {
        self.root.join(STAGING_DIR).join(tx.id())
    }

    fn open_staging(&self, tx: &Transaction) -> Result<PathBuf> {
        let staging = self.staging(tx);
        if !staging.is_dir() {
            bail!("transaction {} is not open", tx);
        }
        Ok(staging)
    }

    pub fn begin(&self) -> Result<Transaction> {
        let tx = Transaction::new();
        let staging = self.staging(&tx);
        std::fs::create_dir_all(staging.join(DOCUMENTS_DIR))?;
        std::fs::create_dir_all(staging.join(GRAPHS_DIR))?;
        debug!("Opened transaction {} in {:?}", tx, staging);
        Ok(tx)
    }

    /// Moves every staged file into place while holding the store lock.
    pub fn commit(&self, tx: &Transaction) -> Result<()> {
        let staging = self.open_staging(tx)?;
        let lock = std::fs::File::create(self.root.join(LOCK_FILE))?;
        lock.lock_exclusive()?;

        let mut staged = Vec::new();
        for entry in WalkDir::new(&staging) {
            let entry = entry?;
            if entry.file_type().is_file() {
                staged.push(entry.into_path());
            }
        }
        let mut moved = 0usize;
        for path in staged {
            let relative = path.strip_prefix(&staging)?;
            let target = self.root.join(relative);
            // graph records are create-if-absent
            if relative.starts_with(GRAPHS_DIR) && target.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&path, &target)
                .with_context(|| format!("failed to move {:?} into place", relative))?;
            moved += 1;
        }
        std::fs::remove_dir_all(&staging)?;
        lock.unlock()?;
        info!("Committed transaction {} ({} files)", tx, moved);
        Ok(())
    }

    pub fn rollback(&self, tx: &Transaction) -> Result<()> {
        let staging = self.open_staging(tx)?;
        std::fs::remove_dir_all(staging)?;
        info!("Rolled back transaction {}", tx);
        Ok(())
    }

    /// Metadata of every committed document, sorted by URI.
    pub fn documents(&self) -> Result<Vec<DocumentRecord>> {
        let mut records = Vec::new();
        for entry in WalkDir::new(self.root.join(DOCUMENTS_DIR)) {
            let entry = entry?;
            let is_meta = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(META_SUFFIX));
            if !entry.file_type().is_file() || !is_meta {
                continue;
            }
            let file = std::fs::File::open(entry.path())?;
            let record: DocumentRecord = serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("failed to read {:?}", entry.path()))?;
            records.push(record);
        }
        records.sort_by(|a, b| a.uri.cmp(&b.uri));
        Ok(records)
    }

    /// Reads the text of a committed document.
    pub fn read_document(&self, uri: &str) -> Result<String> {
        let path = self.root.join(DOCUMENTS_DIR).join(document_path(uri)?);
        Ok(std::fs::read_to_string(path)?)
    }

    /// Committed graph existence records, sorted.
    pub fn graphs(&self) -> Result<Vec<String>> {
        let mut graphs = Vec::new();
        for entry in std::fs::read_dir(self.root.join(GRAPHS_DIR))? {
            let entry = entry?;
            let file = std::fs::File::open(entry.path())?;
            let record: GraphRecord = serde_json::from_reader(std::io::BufReader::new(file))?;
            graphs.push(record.graph);
        }
        graphs.sort();
        Ok(graphs)
    }
}

/// Maps a document URI to a relative path, refusing anything that would
/// escape the documents directory.
fn document_path(uri: &str) -> Result<PathBuf> {
    let path = PathBuf::from(uri.trim_start_matches('/'));
    let safe = path.components().all(|c| matches!(c, Component::Normal(_)));
    if !safe || path.as_os_str().is_empty() {
        bail!("document URI {:?} cannot be stored", uri);
    }
    Ok(path)
}

fn graph_file(graph: &str) -> String {
    format!("{}.json", blake3::hash(graph.as_bytes()).to_hex())
}

impl DocumentStore for DirectoryStore {
    fn write(&self, write_set: &WriteSet, tx: &Transaction) -> Result<()> {
        let documents = self.open_staging(tx)?.join(DOCUMENTS_DIR);
        let written = Utc::now();
        for entry in write_set {
            let path = documents.join(document_path(&entry.uri)?);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, entry.content.as_bytes())?;
            let record = DocumentRecord {
                uri: entry.uri.clone(),
                graph: entry.graph.clone(),
                statements: entry.statements,
                written,
            };
            let mut meta = path.into_os_string();
            meta.push(META_SUFFIX);
            std::fs::write(meta, serde_json::to_string_pretty(&record)?)?;
        }
        Ok(())
    }

    fn ensure_graphs_exist(&self, graphs: &[String], tx: &Transaction) -> Result<()> {
        let staged = self.open_staging(tx)?.join(GRAPHS_DIR);
        for graph in graphs {
            check_graph_iri(graph)?;
            let name = graph_file(graph);
            if self.root.join(GRAPHS_DIR).join(&name).exists() {
                continue;
            }
            let record = GraphRecord {
                graph: graph.clone(),
                created: Utc::now(),
            };
            std::fs::write(staged.join(name), serde_json::to_string_pretty(&record)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::DocumentEntry;

    fn entry(uri: &str, graph: &str) -> DocumentEntry {
        DocumentEntry {
            uri: uri.to_string(),
            graph: graph.to_string(),
            content: format!("<doc uri=\"{}\"/>", uri),
            statements: 1,
        }
    }

    #[test]
    fn test_memory_store_commit_and_rollback() {
        let store = MemoryStore::new();
        let tx = store.begin();
        let ws: WriteSet = vec![entry("/t/a.xml", "http://example.org/g")].into_iter().collect();
        store.write(&ws, &tx).unwrap();
        store
            .ensure_graphs_exist(&["http://example.org/g".to_string()], &tx)
            .unwrap();
        assert!(store.documents().is_empty());
        assert_eq!(store.staged_documents(&tx).len(), 1);
        store.commit(&tx).unwrap();
        assert_eq!(store.documents().len(), 1);
        assert_eq!(store.graphs(), vec!["http://example.org/g".to_string()]);

        let tx = store.begin();
        let ws: WriteSet = vec![entry("/t/b.xml", "http://example.org/g")].into_iter().collect();
        store.write(&ws, &tx).unwrap();
        store.rollback(&tx).unwrap();
        assert_eq!(store.documents().len(), 1);
        assert!(store.write(&ws, &tx).is_err());
    }

    #[test]
    fn test_invalid_graph_iri_rejected() {
        let store = MemoryStore::new();
        let tx = store.begin();
        assert!(store
            .ensure_graphs_exist(&["not an iri".to_string()], &tx)
            .is_err());
    }

    #[test]
    fn test_directory_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let tx = store.begin().unwrap();
        let ws: WriteSet = vec![
            entry("/triplestore/a.xml", "http://example.org/g1"),
            entry("/triplestore/b.xml", "http://example.org/g2"),
        ]
        .into_iter()
        .collect();
        store.write(&ws, &tx).unwrap();
        let graphs = vec![
            "http://example.org/g1".to_string(),
            "http://example.org/g2".to_string(),
        ];
        store.ensure_graphs_exist(&graphs, &tx).unwrap();
        assert!(store.documents().unwrap().is_empty());

        store.commit(&tx).unwrap();
        let records = store.documents().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].uri, "/triplestore/a.xml");
        assert_eq!(records[1].graph, "http://example.org/g2");
        assert_eq!(
            store.read_document("/triplestore/a.xml").unwrap(),
            "<doc uri=\"/triplestore/a.xml\"/>"
        );
        assert_eq!(store.graphs().unwrap(), graphs);

        // existing graph records are left alone
        let tx = store.begin().unwrap();
        store.ensure_graphs_exist(&graphs, &tx).unwrap();
        store.commit(&tx).unwrap();
        assert_eq!(store.graphs().unwrap().len(), 2);
    }

    #[test]
    fn test_directory_store_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        let tx = store.begin().unwrap();
        let ws: WriteSet = vec![entry("/triplestore/a.xml", "http://example.org/g")]
            .into_iter()
            .collect();
        store.write(&ws, &tx).unwrap();
        store.rollback(&tx).unwrap();
        assert!(store.documents().unwrap().is_empty());
        assert!(store.write(&ws, &tx).is_err());
    }

    #[test]
    fn test_document_path_stays_inside() {
        assert!(document_path("/triplestore/x.xml").is_ok());
        assert!(document_path("/../etc/passwd").is_err());
        assert!(document_path("/").is_err());
    }
}
