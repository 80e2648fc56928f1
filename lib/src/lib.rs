extern crate derive_builder;

pub mod batcher;
pub mod config;
pub mod consts;
pub mod dispatch;
pub mod encoder;
pub mod errors;
pub mod ingest;
pub mod partition;
pub mod router;
pub mod source;
pub mod store;

pub use crate::config::{IngestConfig, ModeLimits};
pub use crate::errors::{DecodeError, EncodeError, IngestError};
pub use crate::ingest::{ingest, IngestReport, Ingester};
pub use crate::router::IngestMode;
pub use crate::source::{ParserSource, QuadSource, StatementHandler, StatementSource};
pub use crate::store::{DirectoryStore, DocumentStore, MemoryStore, Transaction};

pub fn init_logging() {
    // Allow RDFDOCS_LOG to override RUST_LOG for consistent CLI defaults.
    if let Ok(log_level) = std::env::var("RDFDOCS_LOG") {
        std::env::set_var("RUST_LOG", log_level);
    }
}
