use std::path::PathBuf;
use thiserror::Error;

use crate::models::RecordKind;

/// Raised when an input file is not syntactically valid JSON or YAML.
///
/// File scoped: the caller skips the file and keeps processing the batch.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The document could not be parsed as JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document could not be parsed as YAML.
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A single raw record lacks one or more required fields.
///
/// Record scoped: the record is dropped, the rest of the file is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} record missing required field(s): {}", .missing.join(", "))]
pub struct ValidationError {
    pub kind: RecordKind,
    pub missing: Vec<&'static str>,
}

/// Resource-level failures that abort a whole batch, plus startup errors.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory cannot be created or written to.
    #[error("Output directory {path} is not usable: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input directory to scan does not exist.
    #[error("Input directory not found: {0}")]
    InputDirectoryNotFound(PathBuf),

    /// A configuration value or file is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the processor crates.
pub type Result<T> = std::result::Result<T, ProcessorError>;
