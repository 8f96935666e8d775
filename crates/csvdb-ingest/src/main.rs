//! csvdb-ingest - load every CSV file of a directory into its own table
//!
//! Configuration comes from the environment (and `.env`); there are no flags.
//!
//! Exit status:
//! - `0`: run completed, including runs where individual files failed
//! - `1`: invalid configuration or missing input directory
//! - `2`: `INGEST_FAIL_ON_ERROR=true` and at least one file failed

use anyhow::Result;
use csvdb_common::logging::{init_logging, LogConfig};
use csvdb_ingest::{config::IngestConfig, job::IngestJob};
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_ABORTED: u8 = 1;
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let log_config = LogConfig::from_env()?;
    let _logging = init_logging(&log_config)?;

    let config = match IngestConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Invalid configuration");
            return Ok(ExitCode::from(EXIT_ABORTED));
        },
    };

    info!(
        input_dir = %config.input_dir.display(),
        database = %config.database.display_target(),
        "Configuration loaded"
    );

    let job = IngestJob::new(config);
    let report = match job.run().await {
        Ok(report) => report,
        Err(_) => return Ok(ExitCode::from(EXIT_ABORTED)),
    };

    info!("Data ingestion process finished");

    if job.config().fail_on_error && report.has_failures() {
        error!(
            failed = report.failed().count(),
            "Exiting with failure status because INGEST_FAIL_ON_ERROR is set"
        );
        return Ok(ExitCode::from(EXIT_PARTIAL_FAILURE));
    }

    Ok(ExitCode::SUCCESS)
}
