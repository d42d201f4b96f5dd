//! Writes tabular records to the destination store.
//!
//! Every chunk is written in its own transaction: `replace` drops and recreates
//! the table, `append` adds rows to it. Neither deduplicates.

pub mod postgres;
pub mod schema;
pub mod sqlite;

use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use sqlx::{Database, Encode, Executor, IntoArguments, Pool, QueryBuilder, Type};
use tracing::{debug, info, warn};

pub use self::{postgres::PostgresStore, schema::TableName, sqlite::SqliteStore};
use self::schema::{Dialect, TableSchema};
use crate::{
    config::DestinationConfig,
    error::LoadError,
    outcome::{ChunkState, LoadOutcome},
    plan::Chunk,
    transform::TabularRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WriteMode {
    /// The table becomes exactly the written snapshot
    Replace,
    /// Rows are added to whatever the table holds
    Append,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteMode::Replace => "replace",
            WriteMode::Append => "append",
        })
    }
}

pub trait Store {
    /// Writes `records` in one transaction and returns the number of rows inserted.
    async fn write(
        &self,
        table: &TableName,
        records: &[TabularRecord],
        mode: WriteMode,
    ) -> Result<u64, LoadError>;

    async fn row_count(&self, table: &TableName) -> Result<u64, LoadError>;
}

/// The configured destination, opened once per run.
pub enum Destination {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
}

impl Destination {
    pub async fn connect(config: &DestinationConfig) -> Result<Self, LoadError> {
        match config {
            DestinationConfig::Sqlite { path } => {
                Ok(Destination::Sqlite(SqliteStore::open(path).await?))
            }
            DestinationConfig::Postgres(pg) => {
                Ok(Destination::Postgres(PostgresStore::connect(pg).await?))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Destination::Sqlite(store) => format!("sqlite {}", store.path().display()),
            Destination::Postgres(store) => format!("postgres {}", store.host()),
        }
    }
}

impl Store for Destination {
    async fn write(
        &self,
        table: &TableName,
        records: &[TabularRecord],
        mode: WriteMode,
    ) -> Result<u64, LoadError> {
        match self {
            Destination::Sqlite(store) => store.write(table, records, mode).await,
            Destination::Postgres(store) => store.write(table, records, mode).await,
        }
    }

    async fn row_count(&self, table: &TableName) -> Result<u64, LoadError> {
        match self {
            Destination::Sqlite(store) => store.row_count(table).await,
            Destination::Postgres(store) => store.row_count(table).await,
        }
    }
}

/// The write path shared by every backend: one transaction, batched inserts.
async fn write_records<DB>(
    pool: &Pool<DB>,
    dialect: Dialect,
    table: &TableName,
    records: &[TabularRecord],
    mode: WriteMode,
) -> Result<u64, LoadError>
where
    DB: Database,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'q> DateTime<Utc>: Encode<'q, DB> + Type<DB>,
    for<'q> f64: Encode<'q, DB> + Type<DB>,
    for<'q> Option<f64>: Encode<'q, DB> + Type<DB>,
{
    let first = records.first().ok_or_else(|| LoadError::Empty {
        table: table.to_string(),
    })?;
    let schema = TableSchema::from_record(first);

    let mut transaction = pool.begin().await?;

    if mode == WriteMode::Replace {
        sqlx::query::<DB>(&format!("DROP TABLE IF EXISTS {}", table.quoted()))
            .execute(&mut *transaction)
            .await?;
    }
    sqlx::query::<DB>(&schema.create_sql(dialect, table, mode == WriteMode::Append))
        .execute(&mut *transaction)
        .await?;

    let prefix = schema.insert_prefix(table);
    let mut written = 0;

    for batch in records.chunks(schema.rows_per_statement()) {
        let mut qb = QueryBuilder::<DB>::new(&prefix);
        qb.push_values(batch, |mut row, record| {
            row.push_bind(record.time)
                .push_bind(record.latitude)
                .push_bind(record.longitude);
            for variable in &schema.variables {
                row.push_bind(record.value(variable));
            }
            row.push_bind(record.ingestion_timestamp);
        });

        qb.build().execute(&mut *transaction).await?;
        written += batch.len() as u64;
    }

    // Commit the whole chunk at once
    transaction.commit().await?;
    debug!(table = %table, ?dialect, rows = written, "Write committed");

    Ok(written)
}

/// Loads one chunk's records and reports the outcome.
pub async fn load<S: Store>(
    store: &S,
    records: &[TabularRecord],
    table: &TableName,
    mode: WriteMode,
    chunk: &Chunk,
) -> LoadOutcome {
    let name = table.to_string();

    match store.write(table, records, mode).await {
        Ok(written) => {
            info!(chunk = %chunk.label, table = %name, %mode, rows = written, "Chunk loaded");
            LoadOutcome::loaded(&name, mode, &chunk.label, chunk.window, written)
        }
        Err(e) => {
            warn!(chunk = %chunk.label, table = %name, error = %e, "Load failed");
            LoadOutcome::failed(&name, mode, &chunk.label, chunk.window, ChunkState::LoadFailed, e)
        }
    }
}

/// Path of the default local database.
pub fn default_sqlite_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("era5land").join("era5land.sqlite"))
}
