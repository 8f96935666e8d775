//! Replace-table writes to Postgres

use crate::config::DatabaseConfig;
use crate::frame::{Column, ColumnData, Frame};
use sqlx::postgres::PgConnection;
use sqlx::query_builder::Separated;
use sqlx::{Connection, Postgres, QueryBuilder};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Postgres accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("could not connect to the database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database connection not established within {}s", .0.as_secs())]
    ConnectTimeout(Duration),

    #[error("database rejected the write: {0}")]
    Database(#[from] sqlx::Error),

    #[error("write did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Destination for loaded frames
#[allow(async_fn_in_trait)]
pub trait TableSink {
    /// Drop `table` if it exists, recreate it with the frame's columns and insert
    /// every row. Returns the number of rows written.
    async fn replace_table(&mut self, table: &str, frame: &Frame) -> Result<u64, WriteError>;
}

/// Writes frames over a single Postgres connection, one transaction per table
pub struct PgTableWriter {
    conn: PgConnection,
    batch_size: usize,
}

impl PgTableWriter {
    /// Open the connection described by `config`
    pub async fn connect(config: &DatabaseConfig, batch_size: usize) -> Result<Self, WriteError> {
        let timeout = config.connect_timeout();
        let conn = tokio::time::timeout(timeout, PgConnection::connect(&config.connection_url()))
            .await
            .map_err(|_| WriteError::ConnectTimeout(timeout))?
            .map_err(WriteError::Connect)?;

        info!(target_db = %config.display_target(), "Database connection established");

        Ok(Self::from_connection(conn, batch_size))
    }

    pub fn from_connection(conn: PgConnection, batch_size: usize) -> Self {
        Self {
            conn,
            batch_size: batch_size.max(1),
        }
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Close the connection, waiting for the server to acknowledge
    pub async fn close(self) -> Result<(), WriteError> {
        self.conn.close().await?;
        debug!("Database connection closed");
        Ok(())
    }
}

impl TableSink for PgTableWriter {
    async fn replace_table(&mut self, table: &str, frame: &Frame) -> Result<u64, WriteError> {
        let quoted = quote_identifier(table);
        let mut tx = self.conn.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted))
            .execute(&mut *tx)
            .await?;

        sqlx::query(&create_table_sql(table, frame))
            .execute(&mut *tx)
            .await?;

        let rows = insert_rows(&mut tx, table, frame, self.batch_size).await?;

        tx.commit().await?;

        Ok(rows)
    }
}

/// [`PgTableWriter`] that connects on the first write.
///
/// A failed connect fails only the write that attempted it; the next write
/// tries again.
pub struct LazyPgWriter {
    config: DatabaseConfig,
    batch_size: usize,
    writer: Option<PgTableWriter>,
}

impl LazyPgWriter {
    pub fn new(config: DatabaseConfig, batch_size: usize) -> Self {
        Self {
            config,
            batch_size,
            writer: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Close the connection if one was ever opened
    pub async fn close(self) -> Result<(), WriteError> {
        match self.writer {
            Some(writer) => writer.close().await,
            None => Ok(()),
        }
    }
}

impl TableSink for LazyPgWriter {
    async fn replace_table(&mut self, table: &str, frame: &Frame) -> Result<u64, WriteError> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => PgTableWriter::connect(&self.config, self.batch_size).await?,
        };

        self.writer.insert(writer).replace_table(table, frame).await
    }
}

/// Double-quote an identifier so it is used exactly as given
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` statement matching the frame's columns, all nullable
pub fn create_table_sql(table: &str, frame: &Frame) -> String {
    let columns = frame
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type().sql_type()))
        .collect::<Vec<_>>()
        .join(", ");

    format!("CREATE TABLE {} ({})", quote_identifier(table), columns)
}

/// Rows per INSERT, bounded by `batch_size` and the bind-parameter ceiling
pub fn rows_per_statement(batch_size: usize, column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).min(batch_size).max(1)
}

async fn insert_rows(
    conn: &mut PgConnection,
    table: &str,
    frame: &Frame,
    batch_size: usize,
) -> Result<u64, WriteError> {
    let total = frame.row_count();
    if total == 0 {
        return Ok(0);
    }

    let column_list = frame
        .columns()
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let prefix = format!("INSERT INTO {} ({}) ", quote_identifier(table), column_list);

    let chunk = rows_per_statement(batch_size, frame.column_count());
    let total_chunks = total.div_ceil(chunk);
    let mut inserted = 0;

    for (chunk_idx, start) in (0..total).step_by(chunk).enumerate() {
        let end = (start + chunk).min(total);

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(&prefix);
        query_builder.push_values(start..end, |mut b, row| {
            for column in frame.columns() {
                push_cell(&mut b, column, row);
            }
        });

        let result = query_builder.build().execute(&mut *conn).await?;
        inserted += result.rows_affected();

        debug!(
            table = %table,
            chunk = chunk_idx + 1,
            chunks = total_chunks,
            rows = end - start,
            "Inserted chunk"
        );
    }

    Ok(inserted)
}

fn push_cell<'args>(
    b: &mut Separated<'_, 'args, Postgres, &'static str>,
    column: &'args Column,
    row: usize,
) {
    match &column.data {
        ColumnData::BigInt(v) => {
            b.push_bind(v.get(row).copied().flatten());
        },
        ColumnData::Double(v) => {
            b.push_bind(v.get(row).copied().flatten());
        },
        ColumnData::Boolean(v) => {
            b.push_bind(v.get(row).copied().flatten());
        },
        ColumnData::Text(v) => {
            b.push_bind(v.get(row).and_then(|c| c.as_deref()));
        },
    }
}
