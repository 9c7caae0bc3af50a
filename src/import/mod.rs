//! Spreadsheet-export import pipeline.
//!
//! Headers are resolved against a fixed alias table, each row is transformed
//! into one canonical record per detected subject, and every record is upserted
//! by natural key inside its own store scope.

pub mod aliases;
pub mod config;
pub mod error;
pub mod identity;
pub mod multiplex;
pub mod orchestrator;
pub mod parse;
pub mod record;
pub mod report;
pub mod resolver;
pub mod source;
pub mod transform;

pub use config::ImportConfig;
pub use error::ImportError;
pub use orchestrator::Importer;
pub use report::ImportReport;
