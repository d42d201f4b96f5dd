use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};

use super::{
    schema::{Dialect, TableName},
    write_records, Store, WriteMode,
};
use crate::{config::PostgresConfig, error::LoadError, transform::TabularRecord};

/// A remote Postgres database, typically behind a transaction pooler.
pub struct PostgresStore {
    pool: PgPool,
    host: String,
}

impl PostgresStore {
    pub async fn connect(config: &PostgresConfig) -> Result<Self, LoadError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(connect_options(config))
            .await?;

        Ok(PostgresStore {
            pool,
            host: format!("{}:{}/{}", config.host, config.port, config.database),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

fn connect_options(config: &PostgresConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
        .ssl_mode(if config.tls_required {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        })
        // Transaction poolers do not keep prepared statements between transactions
        .statement_cache_capacity(0)
}

impl Store for PostgresStore {
    async fn write(
        &self,
        table: &TableName,
        records: &[TabularRecord],
        mode: WriteMode,
    ) -> Result<u64, LoadError> {
        write_records(&self.pool, Dialect::Postgres, table, records, mode).await
    }

    async fn row_count(&self, table: &TableName) -> Result<u64, LoadError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.quoted()))
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn config(tls_required: bool) -> PostgresConfig {
        PostgresConfig {
            user: "postgres.project".to_string(),
            password: "secret".to_string(),
            host: "aws-0-eu-central-1.pooler.supabase.com".to_string(),
            port: 6543,
            database: "postgres".to_string(),
            tls_required,
        }
    }

    #[test]
    fn should_build_connect_options_from_config() {
        let options = connect_options(&config(true));

        assert_eq!(options.get_host(), "aws-0-eu-central-1.pooler.supabase.com");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "postgres.project");
        assert_eq!(options.get_database(), Some("postgres"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Require));
    }

    #[test]
    fn should_prefer_tls_when_not_required() {
        let options = connect_options(&config(false));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Prefer));
    }
}
