//! csvdb Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the csvdb workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the job-level error type and result alias
//! - **Logging**: console/file `tracing` setup with an owned lifecycle guard
//!
//! # Example
//!
//! ```no_run
//! use csvdb_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _logging = init_logging(&LogConfig::from_env()?)?;
//!     info!("Starting data ingestion process");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CsvdbError, Result};
