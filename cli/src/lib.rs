use anyhow::{bail, Error, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use oxigraph::model::{GraphName, NamedNode};
use rdfdocs::config::IngestConfig;
use rdfdocs::encoder::decode_document;
use rdfdocs::ingest::{IngestReport, Ingester};
use rdfdocs::source::{format_from_name, format_from_path};
use rdfdocs::store::{DirectoryStore, DocumentStore, MemoryStore, Transaction};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "rdfdocs")]
#[command(about = "Loads RDF files into an XML triple document store")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Write the default ingest configuration to a file.
    Init {
        /// Destination file, defaults to rdfdocs.json
        #[clap(default_value = "rdfdocs.json")]
        file: PathBuf,
        /// Overwrite the file if it already exists
        #[clap(long, default_value = "false")]
        overwrite: bool,
    },
    /// Print the effective ingest configuration.
    Show {
        /// Configuration file to read; the defaults are shown when omitted
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest RDF files, or every RDF file below the given directories
    Ingest {
        /// Files or directories to ingest
        #[clap(required = true)]
        paths: Vec<PathBuf>,
        /// Directory of the document store
        #[clap(long, short)]
        store: Option<PathBuf>,
        /// Input format as extension or media type (ttl, nq, application/n-triples, ...).
        /// Detected from each file's extension when omitted
        #[clap(long, short)]
        format: Option<String>,
        /// Write every statement into this graph instead of its own; may be repeated.
        /// Use "default" for the default graph
        #[clap(long = "graph", short = 'g')]
        graphs: Vec<String>,
        /// Base IRI for relative IRIs, defaults to the file's own URI
        #[clap(long)]
        base_iri: Option<String>,
        /// Ingest configuration file
        #[clap(long, short)]
        config: Option<PathBuf>,
        /// Encode and batch everything in memory without touching the store
        #[clap(long, action, default_value = "false")]
        dry_run: bool,
        /// Output JSON instead of text
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Per-graph document and statement counts of a store
    Stats {
        /// Directory of the document store
        #[clap(long, short)]
        store: PathBuf,
        /// Output JSON instead of text
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Manage the ingest configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Prints the version of the rdfdocs binary
    Version,
}

pub fn run() -> Result<()> {
    rdfdocs::init_logging();
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    rdfdocs::init_logging();
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn execute(cmd: Cli) -> Result<()> {
    // The RUST_LOG env var is set by `init_logging` if RDFDOCS_LOG is present.
    // CLI flags for verbosity take precedence. If nothing is set, we default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    match cmd.command {
        Commands::Ingest {
            paths,
            store,
            format,
            graphs,
            base_iri,
            config,
            dry_run,
            json,
        } => {
            let config = match config {
                Some(file) => IngestConfig::from_file(&file)?,
                None => IngestConfig::default(),
            };
            let format = format.as_deref().map(format_from_name).transpose()?;
            let overrides = parse_graphs(&graphs)?;
            let target = match (store, dry_run) {
                (_, true) => Target::Memory(MemoryStore::new()),
                (Some(dir), false) => Target::Directory(DirectoryStore::open(dir)?),
                (None, false) => bail!("--store is required unless --dry-run is given"),
            };
            let files = collect_files(&paths, format.is_some())?;
            if files.is_empty() {
                bail!("No RDF files found");
            }

            let ingester = Ingester::new(target.store(), &config);
            let mut reports = BTreeMap::new();
            let mut failed = 0usize;
            for file in &files {
                let tx = target.begin()?;
                match ingester.ingest_file(file, format, base_iri.as_deref(), &tx, &overrides) {
                    Ok(report) => {
                        target.commit(&tx)?;
                        if !json {
                            println!(
                                "{}: {} statements, {} documents, {} graph(s) ({} mode)",
                                file.display(),
                                report.statements,
                                report.documents,
                                report.graphs.len(),
                                report.mode
                            );
                        }
                        reports.insert(file.display().to_string(), report);
                    }
                    Err(e) => {
                        error!("Failed to ingest {}: {}", file.display(), e);
                        target.rollback(&tx)?;
                        failed += 1;
                    }
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_totals(&reports);
            }
            if failed > 0 {
                bail!("{} of {} file(s) failed to ingest", failed, files.len());
            }
        }
        Commands::Stats { store, json } => {
            if !store.join("documents").is_dir() {
                bail!("No document store found at {}", store.display());
            }
            let store = DirectoryStore::open(store)?;
            let stats = collect_stats(&store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                for (graph, counts) in &stats.graphs {
                    println!(
                        "<{}>: {} documents, {} statements",
                        graph, counts.documents, counts.statements
                    );
                }
                println!(
                    "{} documents in {} graph(s), {} on disk",
                    stats.documents,
                    stats.graphs.len(),
                    pretty_bytes::converter::convert(stats.size_bytes as f64)
                );
            }
        }
        Commands::Config(ConfigCommands::Init { file, overwrite }) => {
            if file.exists() && !overwrite {
                bail!(
                    "{} already exists. Use --overwrite to replace it",
                    file.display()
                );
            }
            IngestConfig::default().save_to_file(&file)?;
            info!("Wrote default configuration to {}", file.display());
        }
        Commands::Config(ConfigCommands::Show { file }) => {
            let config = match file {
                Some(file) => IngestConfig::from_file(&file)?,
                None => IngestConfig::default(),
            };
            config.print();
        }
        Commands::Version => {
            println!("rdfdocs {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

/// Where an ingest run writes to.
enum Target {
    Directory(DirectoryStore),
    Memory(MemoryStore),
}

impl Target {
    fn store(&self) -> &dyn DocumentStore {
        match self {
            Target::Directory(store) => store,
            Target::Memory(store) => store,
        }
    }

    fn begin(&self) -> Result<Transaction> {
        match self {
            Target::Directory(store) => store.begin(),
            Target::Memory(store) => Ok(store.begin()),
        }
    }

    fn commit(&self, tx: &Transaction) -> Result<()> {
        match self {
            Target::Directory(store) => store.commit(tx),
            // a dry run never publishes anything
            Target::Memory(store) => store.rollback(tx),
        }
    }

    fn rollback(&self, tx: &Transaction) -> Result<()> {
        match self {
            Target::Directory(store) => store.rollback(tx),
            Target::Memory(store) => store.rollback(tx),
        }
    }
}

fn parse_graphs(graphs: &[String]) -> Result<Vec<GraphName>> {
    graphs
        .iter()
        .map(|graph| {
            if graph == "default" || graph.is_empty() {
                return Ok(GraphName::DefaultGraph);
            }
            let node = NamedNode::new(graph.as_str())
                .map_err(|e| anyhow::anyhow!("Invalid graph IRI <{}>: {}", graph, e))?;
            Ok(GraphName::NamedNode(node))
        })
        .collect()
}

/// Expands directories into the RDF files below them. Files named directly
/// are kept even with an unknown extension when a format was given.
fn collect_files(paths: &[PathBuf], explicit_format: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() && format_from_path(entry.path()).is_ok() {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            if !explicit_format {
                format_from_path(path)?;
            }
            files.push(path.clone());
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    Ok(files)
}

fn print_totals(reports: &BTreeMap<String, IngestReport>) {
    let statements: usize = reports.values().map(|r| r.statements).sum();
    let documents: usize = reports.values().map(|r| r.documents).sum();
    println!(
        "Ingested {} file(s): {} statements in {} documents",
        reports.len(),
        statements,
        documents
    );
}

#[derive(Debug, Default, serde::Serialize)]
struct GraphStats {
    documents: usize,
    statements: usize,
}

#[derive(Debug, Default, serde::Serialize)]
struct StoreStats {
    documents: usize,
    size_bytes: u64,
    graphs: BTreeMap<String, GraphStats>,
}

fn collect_stats(store: &DirectoryStore) -> Result<StoreStats> {
    let mut stats = StoreStats::default();
    for graph in store.graphs()? {
        stats.graphs.entry(graph).or_default();
    }
    for record in store.documents()? {
        let content = store.read_document(&record.uri)?;
        let triples = decode_document(&content)
            .map_err(|e| anyhow::anyhow!("Failed to decode {}: {}", record.uri, e))?;
        let counts = stats.graphs.entry(record.graph).or_default();
        counts.documents += 1;
        counts.statements += triples.len();
        stats.documents += 1;
    }
    stats.size_bytes = dir_size(&store.root().join("documents"));
    Ok(stats)
}

fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
