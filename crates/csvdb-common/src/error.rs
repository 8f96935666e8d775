//! Error types for csvdb

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for csvdb job operations
pub type Result<T> = std::result::Result<T, CsvdbError>;

/// Job-level errors.
///
/// Every variant here aborts the run. Failures scoped to a single file are
/// reported through the ingest crate's `LoadError` and never reach this type.
#[derive(Error, Debug)]
pub enum CsvdbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured input directory is missing or is not a directory
    #[error("Input directory '{}' not found. Please create it and place your CSV files inside.", .0.display())]
    InputDirNotFound(PathBuf),

    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),
}

impl CsvdbError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error stems from the job's configuration rather than its environment
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InputDirNotFound(_) | Self::Config(_))
    }
}
