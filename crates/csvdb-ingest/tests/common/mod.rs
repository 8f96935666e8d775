//! Shared helpers for csvdb-ingest integration tests
//!
//! - [`MemorySink`]: an in-memory [`TableSink`] for exercising job semantics
//!   without a database
//! - [`TestPostgres`]: a throwaway PostgreSQL container (requires Docker)
//! - [`Dataset`]: a scratch input directory with CSV files

#![allow(dead_code)]

use anyhow::{Context, Result};
use csvdb_ingest::config::{DatabaseConfig, IngestConfig};
use csvdb_ingest::frame::{ColumnType, Frame};
use csvdb_ingest::writer::{TableSink, WriteError};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

// ============================================================================
// Tracing
// ============================================================================

/// Route log output through the test harness; safe to call from every test
pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,csvdb_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Input directory
// ============================================================================

/// Temporary directory holding a `dataset/` folder of CSV files
pub struct Dataset {
    root: TempDir,
}

impl Dataset {
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("Failed to create temp dir")?;
        std::fs::create_dir(root.path().join("dataset")).context("Failed to create dataset dir")?;
        Ok(Self { root })
    }

    /// The input directory
    pub fn dir(&self) -> PathBuf {
        self.root.path().join("dataset")
    }

    /// A path under the temp root that does not exist
    pub fn missing_dir(&self) -> PathBuf {
        self.root.path().join("no-such-dataset")
    }

    pub fn write(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        self.write_bytes(file_name, contents.as_bytes())
    }

    pub fn write_bytes(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.dir().join(file_name);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Job configuration reading from this dataset
    pub fn config(&self) -> IngestConfig {
        config_for(&self.dir())
    }
}

pub fn config_for(input_dir: &Path) -> IngestConfig {
    IngestConfig {
        input_dir: input_dir.to_path_buf(),
        ..IngestConfig::default()
    }
}

pub const PRODUCTS_CSV: &str = "id,name,price\n1,Widget,9.99\n2,Gadget,19.99\n";

pub const VENDORS_CSV: &str = "VendorNumber,VendorName,Active\n\
                               105,ALTAMAR BRANDS LLC,true\n\
                               287,AMERICAN VINTAGE BEVERAGE,false\n\
                               388,ATLANTIC IMPORTING COMPANY,true\n";

// ============================================================================
// In-memory sink
// ============================================================================

/// What [`MemorySink`] keeps per table
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTable {
    pub columns: Vec<(String, ColumnType)>,
    /// Cells rendered as text; nulls render as empty strings
    pub rows: Vec<Vec<String>>,
}

impl StoredTable {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// [`TableSink`] that keeps tables in a map, optionally rejecting some names
#[derive(Debug, Default)]
pub struct MemorySink {
    pub tables: BTreeMap<String, StoredTable>,
    /// Table names in the order they were written
    pub writes: Vec<String>,
    rejected: HashSet<String>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write to any of `tables` the way a database would
    pub fn rejecting(tables: &[&str]) -> Self {
        Self {
            rejected: tables.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Sleep before every write
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Pre-populate a table, as if left behind by an earlier run
    pub fn seed(&mut self, table: &str, columns: &[&str], rows: &[&[&str]]) {
        self.tables.insert(
            table.to_string(),
            StoredTable {
                columns: columns.iter().map(|c| (c.to_string(), ColumnType::Text)).collect(),
                rows: rows
                    .iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
            },
        );
    }
}

impl TableSink for MemorySink {
    async fn replace_table(&mut self, table: &str, frame: &Frame) -> Result<u64, WriteError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.rejected.contains(table) {
            return Err(WriteError::Database(sqlx::Error::Protocol(format!(
                "invalid table name \"{}\"",
                table
            ))));
        }

        let stored = StoredTable {
            columns: frame
                .columns()
                .iter()
                .map(|c| (c.name.clone(), c.column_type()))
                .collect(),
            rows: (0..frame.row_count())
                .filter_map(|idx| frame.row(idx))
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect(),
        };

        let rows = stored.rows.len() as u64;
        self.tables.insert(table.to_string(), stored);
        self.writes.push(table.to_string());

        Ok(rows)
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL test container wrapper
///
/// The container is stopped when the wrapper is dropped.
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    host: String,
    port: u16,
}

impl TestPostgres {
    /// Start a PostgreSQL 16 container
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?
            .to_string();
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        debug!(host = %host, port, "PostgreSQL container ready");

        Ok(Self {
            _container: container,
            host,
            port,
        })
    }

    /// Connection settings for the container's default database
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.host.clone(),
            port: self.port,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            url: None,
            connect_timeout_secs: 30,
        }
    }

    /// Job configuration reading `input_dir` and writing to this container
    pub fn ingest_config(&self, input_dir: &Path) -> IngestConfig {
        IngestConfig {
            database: self.database_config(),
            ..config_for(input_dir)
        }
    }
}
