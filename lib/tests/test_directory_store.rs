use oxigraph::model::{GraphName, NamedNode};
use rdfdocs::config::IngestConfig;
use rdfdocs::encoder::decode_document;
use rdfdocs::errors::IngestError;
use rdfdocs::ingest::Ingester;
use rdfdocs::store::DirectoryStore;
use std::fs;
use tempfile::tempdir;

const DATASET: &str = r#"
<http://example.org/alice> <http://xmlns.com/foaf/0.1/name> "Alice"@en <http://example.org/people> .
<http://example.org/bob> <http://xmlns.com/foaf/0.1/name> "Bob" <http://example.org/people> .
<http://example.org/alice> <http://xmlns.com/foaf/0.1/knows> <http://example.org/bob> <http://example.org/social> .
_:b0 <http://xmlns.com/foaf/0.1/knows> <http://example.org/alice> <http://example.org/social> .
<http://example.org/s> <http://example.org/p> "default" .
"#;

#[test]
fn test_ingest_nquads_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.nq");
    fs::write(&input, DATASET).unwrap();

    let store = DirectoryStore::open(dir.path().join("store")).unwrap();
    let config = IngestConfig::default();
    let tx = store.begin().unwrap();
    let report = Ingester::new(&store, &config)
        .ingest_file(&input, None, None, &tx, &[])
        .unwrap();

    // nothing is visible before commit
    assert!(store.documents().unwrap().is_empty());
    store.commit(&tx).unwrap();

    assert_eq!(report.statements, 5);
    assert_eq!(report.graphs.len(), 3);
    let records = store.documents().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().map(|r| r.statements).sum::<usize>(), 5);

    let mut graphs = store.graphs().unwrap();
    graphs.sort();
    assert_eq!(
        graphs,
        vec![
            "http://example.org/people".to_string(),
            "http://example.org/social".to_string(),
            "http://marklogic.com/semantics#default-graph".to_string(),
        ]
    );

    for record in &records {
        assert!(record.uri.starts_with("/triplestore/"));
        let triples = decode_document(&store.read_document(&record.uri).unwrap()).unwrap();
        assert_eq!(triples.len(), record.statements);
    }
}

#[test]
fn test_rollback_discards_file_ingest() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("data.nq");
    fs::write(&input, DATASET).unwrap();

    let store = DirectoryStore::open(dir.path().join("store")).unwrap();
    let config = IngestConfig::default();
    let tx = store.begin().unwrap();
    let overrides = [GraphName::NamedNode(
        NamedNode::new("http://example.org/everything").unwrap(),
    )];
    let report = Ingester::new(&store, &config)
        .ingest_file(&input, None, None, &tx, &overrides)
        .unwrap();
    assert_eq!(report.graphs, vec!["http://example.org/everything".to_string()]);

    store.rollback(&tx).unwrap();
    assert!(store.documents().unwrap().is_empty());
    assert!(store.graphs().unwrap().is_empty());
}

#[test]
fn test_unknown_extension() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::open(dir.path()).unwrap();
    let config = IngestConfig::default();
    let tx = store.begin().unwrap();
    let err = Ingester::new(&store, &config)
        .ingest_file(&dir.path().join("notes.txt"), None, None, &tx, &[])
        .unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFormat(_)));

    // valid N-Triples behind a generic extension are still refused
    let notes = dir.path().join("notes.txt");
    fs::write(&notes, "<http://example.org/s> <http://example.org/p> \"o\" .\n").unwrap();
    let err = Ingester::new(&store, &config)
        .ingest_file(&notes, None, None, &tx, &[])
        .unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    store.commit(&tx).unwrap();
    assert!(store.documents().unwrap().is_empty());
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::open(dir.path()).unwrap();
    let config = IngestConfig::default();
    let tx = store.begin().unwrap();
    let err = Ingester::new(&store, &config)
        .ingest_file(&dir.path().join("missing.ttl"), None, None, &tx, &[])
        .unwrap_err();
    assert!(!err.is_parse());
    match &err {
        IngestError::Io { path, .. } => assert!(path.ends_with("missing.ttl")),
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("missing.ttl"), "{}", err);
}

#[test]
fn test_relative_iris_resolve_against_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("local.ttl");
    fs::write(&input, "<#thing> <#label> \"x\" .\n").unwrap();

    let store = DirectoryStore::open(dir.path().join("store")).unwrap();
    let config = IngestConfig::default();
    let tx = store.begin().unwrap();
    Ingester::new(&store, &config)
        .ingest_file(&input, None, None, &tx, &[])
        .unwrap();
    store.commit(&tx).unwrap();

    let records = store.documents().unwrap();
    let triples = decode_document(&store.read_document(&records[0].uri).unwrap()).unwrap();
    let subject = triples[0].subject.to_string();
    assert!(subject.starts_with("<file://"), "{}", subject);
    assert!(subject.ends_with("local.ttl#thing>"), "{}", subject);
}
