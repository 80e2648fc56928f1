use rdfdocs::config::IngestConfig;
use rdfdocs::store::DirectoryStore;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn run(args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["rdfdocs"];
    argv.extend_from_slice(args);
    rdfdocs_cli::run_from_args(argv)
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn write_inputs(dir: &Path) {
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(
        dir.join("people.ttl"),
        "@prefix foaf: <http://xmlns.com/foaf/0.1/> .\n\
         <http://example.org/alice> foaf:name \"Alice\" ; foaf:knows <http://example.org/bob> .\n",
    )
    .unwrap();
    fs::write(
        dir.join("nested").join("data.nq"),
        "<http://example.org/s> <http://example.org/p> \"o\" <http://example.org/g> .\n",
    )
    .unwrap();
    fs::write(dir.join("README.md"), "not rdf").unwrap();
}

#[test]
fn ingest_directory_then_stats() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("input");
    let store_dir = tmp.path().join("store");
    write_inputs(&input);

    run(&["ingest", path_arg(&input), "--store", path_arg(&store_dir)]).unwrap();

    let store = DirectoryStore::open(&store_dir).unwrap();
    let records = store.documents().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().map(|r| r.statements).sum::<usize>(), 3);
    let graphs = store.graphs().unwrap();
    assert!(graphs.contains(&"http://example.org/g".to_string()));

    run(&["stats", "--store", path_arg(&store_dir), "--json"]).unwrap();
}

#[test]
fn ingest_into_override_graph() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("input");
    let store_dir = tmp.path().join("store");
    write_inputs(&input);

    run(&[
        "ingest",
        path_arg(&input.join("people.ttl")),
        "--store",
        path_arg(&store_dir),
        "--graph",
        "http://example.org/override",
    ])
    .unwrap();

    let store = DirectoryStore::open(&store_dir).unwrap();
    assert_eq!(
        store.graphs().unwrap(),
        vec!["http://example.org/override".to_string()]
    );
}

#[test]
fn dry_run_leaves_no_store() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("input");
    write_inputs(&input);

    run(&["ingest", path_arg(&input), "--dry-run"]).unwrap();
    assert!(!tmp.path().join("store").exists());
}

#[test]
fn ingest_requires_store() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("input");
    write_inputs(&input);
    assert!(run(&["ingest", path_arg(&input)]).is_err());
}

#[test]
fn invalid_input_is_rolled_back() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("broken.nt");
    let store_dir = tmp.path().join("store");
    fs::write(
        &input,
        "<http://example.org/s> <http://example.org/p> \"o\" .\nnot a triple\n",
    )
    .unwrap();

    let err = run(&["ingest", path_arg(&input), "--store", path_arg(&store_dir)]).unwrap_err();
    assert!(err.to_string().contains("failed"));
    let store = DirectoryStore::open(&store_dir).unwrap();
    assert!(store.documents().unwrap().is_empty());
}

#[test]
fn unsupported_file_is_rejected() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("notes.txt");
    let store_dir = tmp.path().join("store");
    fs::write(
        &input,
        "<http://example.org/s> <http://example.org/p> \"o\" .\n",
    )
    .unwrap();

    let err = run(&["ingest", path_arg(&input), "--store", path_arg(&store_dir)]).unwrap_err();
    assert!(
        err.to_string().contains("unsupported RDF format"),
        "unexpected error: {}",
        err
    );
    let store = DirectoryStore::open(&store_dir).unwrap();
    assert!(store.documents().unwrap().is_empty());
    assert!(store.graphs().unwrap().is_empty());
}

#[test]
fn directory_walk_skips_text_files() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("input");
    let store_dir = tmp.path().join("store");
    write_inputs(&input);
    fs::write(
        input.join("nested").join("notes.txt"),
        "<http://example.org/txt> <http://example.org/p> \"skipped\" <http://example.org/txt-graph> .\n",
    )
    .unwrap();

    run(&["ingest", path_arg(&input), "--store", path_arg(&store_dir)]).unwrap();

    let store = DirectoryStore::open(&store_dir).unwrap();
    let records = store.documents().unwrap();
    assert_eq!(records.iter().map(|r| r.statements).sum::<usize>(), 3);
    assert!(records
        .iter()
        .all(|r| r.graph != "http://example.org/txt-graph"));
    assert!(!store
        .graphs()
        .unwrap()
        .contains(&"http://example.org/txt-graph".to_string()));
}

#[test]
fn config_init_and_show() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("rdfdocs.json");

    run(&["config", "init", path_arg(&file)]).unwrap();
    let config = IngestConfig::from_file(&file).unwrap();
    assert_eq!(config, IngestConfig::default());

    // refuses to clobber without --overwrite
    assert!(run(&["config", "init", path_arg(&file)]).is_err());
    run(&["config", "init", path_arg(&file), "--overwrite"]).unwrap();
    run(&["config", "show", path_arg(&file)]).unwrap();
}

#[test]
fn invalid_graph_iri() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("input");
    write_inputs(&input);
    assert!(run(&["ingest", path_arg(&input), "--dry-run", "--graph", "not an iri"]).is_err());
}
