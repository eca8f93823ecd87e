//! Error types for tabmerge operations

use crate::schema::TypeMismatch;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TabmergeError>;

#[derive(Error, Debug)]
pub enum TabmergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error(
        "Schema drift detected in '{relation}': missing columns [{}], added columns [{}], type mismatches [{}]",
        .missing.join(", "),
        .added.join(", "),
        format_mismatches(.mismatches)
    )]
    SchemaDrift {
        relation: String,
        missing: Vec<String>,
        added: Vec<String>,
        mismatches: Vec<TypeMismatch>,
    },

    #[error("Run pointer unavailable at {path}: {reason}")]
    MissingPointer { path: PathBuf, reason: String },

    #[error("Canonical store unavailable at {path}: {message}")]
    StoreUnavailable { path: PathBuf, message: String },

    #[error("Export to {path} failed: {message}")]
    Export { path: PathBuf, message: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Data processing error: {message}")]
    DataProcessing { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

fn format_mismatches(mismatches: &[TypeMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl TabmergeError {
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn data_processing(msg: impl Into<String>) -> Self {
        Self::DataProcessing {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn missing_pointer(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MissingPointer {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn store_unavailable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn export(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Export {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this failure.
    ///
    /// Drift, pointer, store and export failures each get their own status so an
    /// orchestrator can tell a real outage apart from a quiet no-op run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SchemaDrift { .. } => 2,
            Self::MissingPointer { .. } => 3,
            Self::StoreUnavailable { .. } => 4,
            Self::Export { .. } => 5,
            _ => 1,
        }
    }
}
