//! csvdb Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads every CSV file in a directory into its own database table.
//!
//! A run is strictly sequential:
//!
//! 1. [`discovery`] lists the `*.csv` files of the input directory (sorted).
//! 2. For each file, [`frame`] parses it into an in-memory [`frame::Frame`]
//!    with inferred column types.
//! 3. [`writer`] replaces the table named after the file with the frame's
//!    schema and rows, inside one transaction per file.
//!
//! [`job::IngestJob`] drives the whole thing, logs per-file failures without
//! aborting, and returns a [`job::JobReport`].
//!
//! # Example
//!
//! ```no_run
//! use csvdb_ingest::{config::IngestConfig, job::IngestJob};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let job = IngestJob::new(IngestConfig::from_env()?);
//!     let report = job.run().await?;
//!     tracing::info!(loaded = report.loaded().count(), "Done");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod frame;
pub mod job;
pub mod writer;

pub use config::{DatabaseConfig, IngestConfig};
pub use discovery::{discover, DatasetFile};
pub use frame::{Frame, ParseError};
pub use job::{IngestJob, JobReport, LoadError};
pub use writer::{LazyPgWriter, PgTableWriter, TableSink, WriteError};
