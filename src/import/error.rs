use std::path::PathBuf;
use thiserror::Error;

/// Conditions that abort an import before any row is processed.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("cannot read source {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source {path} has no header row")]
    NoHeader { path: PathBuf },

    #[error("source {path} has no data rows")]
    NoDataRows { path: PathBuf },

    #[error("source {path} is not valid delimited text: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ImportError {
    /// Stable code used in IPC error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreadable { .. } => "source_unreadable",
            Self::NoHeader { .. } => "source_no_header",
            Self::NoDataRows { .. } => "source_empty",
            Self::Malformed { .. } => "source_malformed",
        }
    }
}
