//! Table store
//!
//! Appends the rows of a `Table` to an existing relation. This module never
//! creates or alters schema:
//! - the target relation must already exist
//! - only the table's own columns are written
//! - one table is appended inside one transaction
//!
//! Supports both PostgreSQL and SQLite through sqlx pools.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Database, Encode, Pool, Postgres, Sqlite, Type};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error};

use crate::domain::error::{AppError, Result};
use crate::domain::table::{Column, DType, Table, Value};

/// Destination for produced tables
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Append every row of `table` to the existing relation `table_name`.
    /// Returns the number of rows written.
    async fn append(&self, table_name: &str, table: &Table) -> Result<u64>;
}

/// Pool settings for the store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout_secs: 10,
        }
    }
}

/// sqlx-backed store
#[derive(Debug, Clone)]
pub enum SqlTableStore {
    Sqlite(Pool<Sqlite>),
    Postgres(Pool<Postgres>),
}

impl SqlTableStore {
    /// Connect with default pool settings
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, &StoreConfig::default()).await
    }

    /// Connect to `sqlite:` or `postgres://` / `postgresql://` URLs
    pub async fn connect_with(database_url: &str, config: &StoreConfig) -> Result<Self> {
        let acquire_timeout = Duration::from_secs(config.connect_timeout_secs);

        if database_url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(database_url).map_err(|e| {
                AppError::LoadError(format!("Failed to parse connection string: {}", e))
            })?;

            // Every connection to an in-memory database sees its own database
            let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
            let pool_options = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new().max_connections(config.max_connections)
            };

            let pool = pool_options
                .acquire_timeout(acquire_timeout)
                .connect_with(options)
                .await
                .map_err(|e| {
                    error!("Failed to connect to SQLite: {}", e);
                    AppError::LoadError(format!("Failed to connect to SQLite: {}", e))
                })?;
            return Ok(SqlTableStore::Sqlite(pool));
        }

        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(database_url)
                .await
                .map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {}", e);
                    AppError::LoadError(format!("Failed to connect to PostgreSQL: {}", e))
                })?;
            return Ok(SqlTableStore::Postgres(pool));
        }

        Err(AppError::LoadError(format!(
            "Unsupported database URL scheme: {}",
            database_url.split(':').next().unwrap_or_default()
        )))
    }

    async fn relation_exists(&self, table_name: &str) -> Result<bool> {
        let found = match self {
            SqlTableStore::Sqlite(pool) => sqlx::query_scalar::<_, String>(
                "SELECT name FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table_name)
            .fetch_optional(pool)
            .await
            .map(|name| name.is_some()),
            SqlTableStore::Postgres(pool) => {
                sqlx::query_scalar::<_, Option<String>>("SELECT to_regclass($1)::text")
                    .bind(quote_identifier(table_name))
                    .fetch_one(pool)
                    .await
                    .map(|name| name.is_some())
            }
        };

        found.map_err(|e| {
            AppError::LoadError(format!("Failed to look up relation '{}': {}", table_name, e))
        })
    }

    fn insert_sql(&self, table_name: &str, table: &Table) -> String {
        let columns = table
            .column_names()
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let placeholders = (1..=table.columns().len())
            .map(|i| match self {
                SqlTableStore::Sqlite(_) => "?".to_string(),
                SqlTableStore::Postgres(_) => format!("${}", i),
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table_name),
            columns,
            placeholders
        )
    }

    async fn append_sqlite(pool: &Pool<Sqlite>, sql: &str, table: &Table) -> Result<u64> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| AppError::LoadError(format!("Failed to begin transaction: {}", e)))?;

        let mut written = 0;
        for row in 0..table.row_count() {
            let mut query = sqlx::query::<Sqlite>(sql);
            for column in table.columns() {
                query = bind_cell(query, column, row)?;
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::LoadError(format!("Insert failed at row {}: {}", row, e)))?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::LoadError(format!("Failed to commit: {}", e)))?;
        Ok(written)
    }

    async fn append_postgres(pool: &Pool<Postgres>, sql: &str, table: &Table) -> Result<u64> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| AppError::LoadError(format!("Failed to begin transaction: {}", e)))?;

        let mut written = 0;
        for row in 0..table.row_count() {
            let mut query = sqlx::query::<Postgres>(sql);
            for column in table.columns() {
                query = bind_cell(query, column, row)?;
            }
            let result = query
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::LoadError(format!("Insert failed at row {}: {}", row, e)))?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::LoadError(format!("Failed to commit: {}", e)))?;
        Ok(written)
    }
}

#[async_trait]
impl TableStore for SqlTableStore {
    async fn append(&self, table_name: &str, table: &Table) -> Result<u64> {
        if !self.relation_exists(table_name).await? {
            return Err(AppError::LoadError(format!(
                "Target relation '{}' does not exist",
                table_name
            )));
        }

        let sql = self.insert_sql(table_name, table);
        debug!(table = %table_name, rows = table.row_count(), %sql, "Appending rows");

        match self {
            SqlTableStore::Sqlite(pool) => Self::append_sqlite(pool, &sql, table).await,
            SqlTableStore::Postgres(pool) => Self::append_postgres(pool, &sql, table).await,
        }
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Bind one cell using the column's declared type, so NULLs stay typed
fn bind_cell<'q, DB>(
    query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    column: &Column,
    row: usize,
) -> Result<Query<'q, DB, <DB as Database>::Arguments<'q>>>
where
    DB: Database,
    Option<bool>: Encode<'q, DB> + Type<DB>,
    Option<i64>: Encode<'q, DB> + Type<DB>,
    Option<f64>: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
    Option<NaiveDateTime>: Encode<'q, DB> + Type<DB>,
    Option<Vec<u8>>: Encode<'q, DB> + Type<DB>,
{
    let value = &column.values[row];
    if value.is_null() {
        return Ok(match column.dtype {
            DType::Boolean => query.bind(None::<bool>),
            DType::Int64 => query.bind(None::<i64>),
            DType::Float64 => query.bind(None::<f64>),
            DType::Utf8 => query.bind(None::<String>),
            DType::DateTime => query.bind(None::<NaiveDateTime>),
            DType::Binary => query.bind(None::<Vec<u8>>),
        });
    }

    let bound = match (column.dtype, value) {
        (DType::Boolean, Value::Bool(b)) => query.bind(Some(*b)),
        (DType::Int64, Value::Int(i)) => query.bind(Some(*i)),
        (DType::Float64, Value::Float(f)) => query.bind(Some(*f)),
        (DType::Float64, Value::Int(i)) => query.bind(Some(*i as f64)),
        (DType::Utf8, Value::Str(s)) => query.bind(Some(s.clone())),
        (DType::DateTime, Value::DateTime(dt)) => query.bind(Some(*dt)),
        (DType::Binary, Value::Bytes(b)) => query.bind(Some(b.clone())),
        (DType::DateTime, Value::Str(raw)) => {
            return Err(AppError::LoadError(format!(
                "Column '{}' row {} holds an unparsable date '{}'",
                column.name, row, raw
            )))
        }
        (dtype, other) => {
            return Err(AppError::LoadError(format!(
                "Column '{}' row {} holds {:?}, incompatible with {}",
                column.name, row, other, dtype
            )))
        }
    };

    Ok(bound)
}
