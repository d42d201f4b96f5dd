use std::path::{Path, PathBuf};

use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};

use super::{
    schema::{Dialect, TableName},
    write_records, Store, WriteMode,
};
use crate::{error::LoadError, transform::TabularRecord};

/// A local SQLite file, created on first use.
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, LoadError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let database_url = format!("sqlite://{}", path.display());
        if !Sqlite::database_exists(&database_url).await.unwrap_or(false) {
            Sqlite::create_database(&database_url).await?;
        }

        // One connection: the pipeline never writes concurrently.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&database_url)
            .await?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;

        Ok(SqliteStore {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for SqliteStore {
    async fn write(
        &self,
        table: &TableName,
        records: &[TabularRecord],
        mode: WriteMode,
    ) -> Result<u64, LoadError> {
        write_records(&self.pool, Dialect::Sqlite, table, records, mode).await
    }

    async fn row_count(&self, table: &TableName) -> Result<u64, LoadError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.quoted()))
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

// -- Tests -------------------------------------------------------------------
