//! The ingestion job: discover, then load each file in turn

use crate::config::IngestConfig;
use crate::discovery::{discover, DatasetFile};
use crate::frame::{Frame, ParseError};
use crate::writer::{LazyPgWriter, TableSink, WriteError};
use chrono::{DateTime, Utc};
use csvdb_common::Result;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Why a single file was skipped
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("write error: {0}")]
    Write(#[from] WriteError),
}

/// A file that was loaded into its table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub file_name: String,
    pub table: String,
    pub rows: u64,
    pub columns: usize,
}

/// A file that was skipped, with the rendered error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub file_name: String,
    pub table: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Loaded(LoadedTable),
    Failed(FailedFile),
}

/// Summary of one run
#[derive(Debug, Clone)]
pub struct JobReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Files matched during discovery
    pub discovered: usize,
    /// One entry per discovered file, in load order
    pub outcomes: Vec<FileOutcome>,
}

impl JobReport {
    pub fn loaded(&self) -> impl Iterator<Item = &LoadedTable> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Loaded(t) => Some(t),
            FileOutcome::Failed(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &FailedFile> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Failed(f) => Some(f),
            FileOutcome::Loaded(_) => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed.as_secs_f64() / 60.0
    }
}

struct RunClock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RunClock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

/// Loads every file of the configured input directory into its own table
#[derive(Debug, Clone)]
pub struct IngestJob {
    config: IngestConfig,
}

impl IngestJob {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run against the configured Postgres database.
    ///
    /// The connection is opened by the first write, so a run that finds no
    /// files never touches the database. A database that cannot be reached
    /// fails each file in turn and the run still completes.
    pub async fn run(&self) -> Result<JobReport> {
        let mut writer = LazyPgWriter::new(self.config.database.clone(), self.config.batch_size);

        let report = self.run_with(&mut writer).await?;

        if let Err(err) = writer.close().await {
            warn!(error = %err, "Database connection did not close cleanly");
        }

        Ok(report)
    }

    /// Run against any [`TableSink`]
    pub async fn run_with<S: TableSink>(&self, sink: &mut S) -> Result<JobReport> {
        let clock = RunClock::start();
        let files = self.discover_files()?;
        let outcomes = self.load_all(&files, sink).await;
        Ok(self.finish(clock, files.len(), outcomes))
    }

    /// Parse one file and replace its table.
    pub async fn load_one<S: TableSink>(
        &self,
        file: &DatasetFile,
        sink: &mut S,
    ) -> std::result::Result<LoadedTable, LoadError> {
        let frame = Frame::from_path(&file.path, self.config.delimiter)?;

        info!(
            rows = frame.row_count(),
            columns = frame.column_count(),
            "Ingesting {} into table {}",
            file.file_name,
            file.table_name
        );

        let write = sink.replace_table(&file.table_name, &frame);
        let rows = match self.config.file_timeout() {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| WriteError::Timeout(limit))??,
            None => write.await?,
        };

        debug!(table = %file.table_name, rows, "Table replaced");

        Ok(LoadedTable {
            file_name: file.file_name.clone(),
            table: file.table_name.clone(),
            rows,
            columns: frame.column_count(),
        })
    }

    fn discover_files(&self) -> Result<Vec<DatasetFile>> {
        let input_dir = &self.config.input_dir;
        info!(input_dir = %input_dir.display(), "Starting data ingestion process");

        let files = discover(input_dir, &self.config.file_extension).inspect_err(|err| {
            error!(error = %err, "Ingestion aborted");
        })?;

        if files.is_empty() {
            warn!(
                "No {} files found in the '{}' directory",
                self.config.file_extension.to_uppercase(),
                input_dir.display()
            );
        } else {
            info!(count = files.len(), "Found files to ingest");
        }

        Ok(files)
    }

    async fn load_all<S: TableSink>(&self, files: &[DatasetFile], sink: &mut S) -> Vec<FileOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());

        for file in files {
            let span = info_span!("ingest_file", file = %file.file_name);

            let outcome = match self.load_one(file, sink).instrument(span).await {
                Ok(loaded) => FileOutcome::Loaded(loaded),
                Err(err) => {
                    error!(
                        file = %file.file_name,
                        table = %file.table_name,
                        "Failed to ingest {}: {}",
                        file.file_name,
                        err
                    );
                    FileOutcome::Failed(FailedFile {
                        file_name: file.file_name.clone(),
                        table: file.table_name.clone(),
                        error: err.to_string(),
                    })
                },
            };

            outcomes.push(outcome);
        }

        outcomes
    }

    fn finish(&self, clock: RunClock, discovered: usize, outcomes: Vec<FileOutcome>) -> JobReport {
        let report = JobReport {
            started_at: clock.started_at,
            elapsed: clock.started.elapsed(),
            discovered,
            outcomes,
        };

        let failed = report.failed().count();
        if failed > 0 {
            warn!(
                loaded = report.loaded().count(),
                failed,
                "Some files could not be ingested"
            );
        }

        info!("----------Ingestion Complete----------");
        info!(
            loaded = report.loaded().count(),
            failed,
            "Total time taken: {:.2} minutes",
            report.elapsed_minutes()
        );

        report
    }
}
