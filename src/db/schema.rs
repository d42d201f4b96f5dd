//! Table layout derived from the first record of a batch.

use std::fmt;

use crate::{
    error::PlanningError,
    transform::{TabularRecord, INGESTION_COLUMN, LATITUDE_COLUMN, LONGITUDE_COLUMN, TIME_COLUMN},
};

/// Bind parameters allowed in one statement; below the SQLite and Postgres limits.
const MAX_BIND_PARAMS: usize = 32_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    fn timestamp_type(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "DATETIME",
            Dialect::Postgres => "TIMESTAMPTZ",
        }
    }

    fn float_type(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "REAL",
            Dialect::Postgres => "DOUBLE PRECISION",
        }
    }
}

/// A validated, optionally schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    parts: Vec<String>,
}

impl TableName {
    pub fn parse(name: &str) -> Result<Self, PlanningError> {
        let invalid = || PlanningError::InvalidTableName {
            name: name.to_string(),
        };

        let parts: Vec<String> = name.split('.').map(str::to_string).collect();
        if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(invalid());
        }

        Ok(TableName { parts })
    }

    pub fn quoted(&self) -> String {
        self.parts
            .iter()
            .map(|p| quote_ident(p))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub variables: Vec<String>,
}

impl TableSchema {
    pub fn from_record(record: &TabularRecord) -> Self {
        TableSchema {
            variables: record.columns.to_vec(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.variables.len() + 4
    }

    pub fn create_sql(&self, dialect: Dialect, table: &TableName, if_not_exists: bool) -> String {
        let ts = dialect.timestamp_type();
        let float = dialect.float_type();

        let mut columns = vec![
            format!("{} {ts} NOT NULL", quote_ident(TIME_COLUMN)),
            format!("{} {float} NOT NULL", quote_ident(LATITUDE_COLUMN)),
            format!("{} {float} NOT NULL", quote_ident(LONGITUDE_COLUMN)),
        ];
        columns.extend(
            self.variables
                .iter()
                .map(|v| format!("{} {float}", quote_ident(v))),
        );
        columns.push(format!("{} {ts} NOT NULL", quote_ident(INGESTION_COLUMN)));

        format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            table.quoted(),
            columns.join(", ")
        )
    }

    /// `INSERT INTO t (...) ` ready for a `VALUES` list.
    pub fn insert_prefix(&self, table: &TableName) -> String {
        let mut columns = vec![
            quote_ident(TIME_COLUMN),
            quote_ident(LATITUDE_COLUMN),
            quote_ident(LONGITUDE_COLUMN),
        ];
        columns.extend(self.variables.iter().map(|v| quote_ident(v)));
        columns.push(quote_ident(INGESTION_COLUMN));

        format!("INSERT INTO {} ({}) ", table.quoted(), columns.join(", "))
    }

    pub fn rows_per_statement(&self) -> usize {
        (MAX_BIND_PARAMS / self.column_count()).max(1)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema {
            variables: vec!["t2m".to_string(), "sp".to_string()],
        }
    }

    #[test]
    fn should_validate_table_names() {
        assert!(TableName::parse("era5_land_data").is_ok());
        assert!(TableName::parse("public.era5_land_data").is_ok());
        assert!(TableName::parse("_staging").is_ok());
        assert!(TableName::parse("").is_err());
        assert!(TableName::parse("1table").is_err());
        assert!(TableName::parse("a.b.c").is_err());
        assert!(TableName::parse("data; DROP TABLE x").is_err());
        assert!(TableName::parse("bad-name").is_err());
    }

    #[test]
    fn should_quote_names() {
        let table = TableName::parse("public.era5").unwrap();
        assert_eq!(table.quoted(), "\"public\".\"era5\"");
        assert_eq!(table.to_string(), "public.era5");
        assert_eq!(quote_ident("2m\"x"), "\"2m\"\"x\"");
    }

    #[test]
    fn should_build_create_sql_per_dialect() {
        let table = TableName::parse("era5").unwrap();

        let sql = schema().create_sql(Dialect::Postgres, &table, false);
        assert_eq!(
            sql,
            "CREATE TABLE \"era5\" (\"time\" TIMESTAMPTZ NOT NULL, \"latitude\" DOUBLE PRECISION NOT NULL, \
             \"longitude\" DOUBLE PRECISION NOT NULL, \"t2m\" DOUBLE PRECISION, \"sp\" DOUBLE PRECISION, \
             \"ingestion_timestamp\" TIMESTAMPTZ NOT NULL)"
        );

        let sql = schema().create_sql(Dialect::Sqlite, &table, true);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"era5\""));
        assert!(sql.contains("\"t2m\" REAL"));
    }

    #[test]
    fn should_build_insert_prefix() {
        let table = TableName::parse("era5").unwrap();
        assert_eq!(
            schema().insert_prefix(&table),
            "INSERT INTO \"era5\" (\"time\", \"latitude\", \"longitude\", \"t2m\", \"sp\", \"ingestion_timestamp\") "
        );
    }

    #[test]
    fn should_keep_statements_under_bind_limit() {
        let s = schema();
        assert_eq!(s.column_count(), 6);
        assert!(s.rows_per_statement() * s.column_count() <= MAX_BIND_PARAMS);

        let wide = TableSchema {
            variables: (0..40_000).map(|i| format!("v{i}")).collect(),
        };
        assert_eq!(wide.rows_per_statement(), 1);
    }
}
