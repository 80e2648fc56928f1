//! Defines the configuration of an ingest call: per-mode document and batch
//! limits, worker pool sizing and the naming of generated documents.

use crate::consts::DOCUMENT_PREFIX;
use crate::errors::IngestError;
use crate::router::IngestMode;
use anyhow::Result;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::path::Path;

/// Sizing knobs that apply to one input mode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeLimits {
    /// Maximum number of statements encoded into one document.
    pub statements_per_document: usize,
    /// Maximum number of documents in one write-set.
    pub documents_per_batch: usize,
    /// Number of worker threads performing store writes.
    pub worker_threads: usize,
    /// Maximum number of graphs sent in one graph-registry request.
    pub max_graphs_per_request: usize,
}

impl ModeLimits {
    /// Limits used for formats without contexts and no override graphs.
    pub const fn triples() -> Self {
        ModeLimits {
            statements_per_document: 1000,
            documents_per_batch: 4,
            worker_threads: 18,
            max_graphs_per_request: 100,
        }
    }

    /// Limits used for quad formats and for supplied override graphs.
    pub const fn quads() -> Self {
        ModeLimits {
            statements_per_document: 100,
            documents_per_batch: 3000,
            worker_threads: 18,
            max_graphs_per_request: 100,
        }
    }

    fn validate(&self, name: &str) -> Result<(), IngestError> {
        let checks = [
            ("statements_per_document", self.statements_per_document),
            ("documents_per_batch", self.documents_per_batch),
            ("worker_threads", self.worker_threads),
            ("max_graphs_per_request", self.max_graphs_per_request),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(IngestError::Config(format!(
                    "{}.{} must be greater than zero",
                    name, field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Builder, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct IngestConfig {
    /// Limits for triple formats without override graphs.
    pub triples: ModeLimits,
    /// Limits for quad formats and supplied override graphs.
    pub quads: ModeLimits,
    /// Number of finished write-sets that may wait for a free worker
    /// before the parsing thread blocks.
    pub queue_depth: usize,
    /// Prefix of generated document URIs.
    pub document_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            triples: ModeLimits::triples(),
            quads: ModeLimits::quads(),
            queue_depth: 16,
            document_prefix: DOCUMENT_PREFIX.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Returns the limits that govern the given input mode.
    pub fn limits(&self, mode: IngestMode) -> &ModeLimits {
        match mode {
            IngestMode::Triple => &self.triples,
            IngestMode::Quad | IngestMode::Context => &self.quads,
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.triples.validate("triples")?;
        self.quads.validate("quads")?;
        if self.document_prefix.is_empty() {
            return Err(IngestError::Config(
                "document_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let file = std::fs::File::open(file)?;
        let reader = BufReader::new(file);
        let config: IngestConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Prints out the current configuration for command line output.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  Document Prefix: {}", self.document_prefix);
        println!("  Queue Depth: {}", self.queue_depth);
        for (name, limits) in [("Triples", &self.triples), ("Quads", &self.quads)] {
            println!("  {}:", name);
            println!(
                "    Statements per Document: {}",
                limits.statements_per_document
            );
            println!("    Documents per Batch: {}", limits.documents_per_batch);
            println!("    Worker Threads: {}", limits.worker_threads);
            println!(
                "    Max Graphs per Request: {}",
                limits.max_graphs_per_request
            );
        }
    }
}
