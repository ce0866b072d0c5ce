//! PostgreSQL Backend Implementation
//!
//! Implements the [`Database`] capability on top of an sqlx `PgPool`.

use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, PgPool, Postgres, Row as SqlxRow, TypeInfo};
use tracing::debug;

use super::{Database, DatabaseTransaction, DatabaseValue, QueryExecutor, QueryOutput, Row, SqlQuery};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, MigrateResult};

/// PostgreSQL database handle backed by a connection pool
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pool from the given configuration
    pub async fn connect(config: &DatabaseConfig) -> MigrateResult<Self> {
        config.validate()?;

        let connect_options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.username)
            .password(&config.password);

        let mut options = PgPoolOptions::new().max_connections(config.max_connections);
        if let Some(timeout) = config.acquire_timeout() {
            options = options.acquire_timeout(timeout);
        }
        if let Some(idle) = config.idle_timeout() {
            options = options.idle_timeout(idle);
        }

        let pool = options.connect_with(connect_options).await.map_err(|e| {
            MigrateError::Connection(format!("Failed to create PostgreSQL pool: {}", e))
        })?;

        debug!(database = %config.name, host = %config.host, "PostgreSQL pool created");
        Ok(Self::new(pool))
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn query(&self, query: &SqlQuery) -> MigrateResult<QueryOutput> {
        run_query(&self.pool, query).await
    }

    async fn begin(&self) -> MigrateResult<Box<dyn DatabaseTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| {
            MigrateError::TransactionControl(format!("Failed to begin transaction: {}", e))
        })?;
        debug!("Transaction started");
        Ok(Box::new(PgTransaction { tx: Some(tx) }))
    }

    async fn close(&self) -> MigrateResult<()> {
        self.pool.close().await;
        debug!("PostgreSQL pool closed");
        Ok(())
    }
}

/// PostgreSQL transaction implementation
pub struct PgTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn inner(&mut self) -> MigrateResult<&mut sqlx::Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| MigrateError::TransactionControl("Transaction already completed".to_string()))
    }
}

#[async_trait]
impl QueryExecutor for PgTransaction {
    async fn query(&mut self, query: &SqlQuery) -> MigrateResult<QueryOutput> {
        let tx = self.inner()?;
        run_query(&mut **tx, query).await
    }

    async fn execute(&mut self, query: &SqlQuery) -> MigrateResult<u64> {
        let tx = self.inner()?;
        run_execute(&mut **tx, query).await
    }
}

#[async_trait]
impl DatabaseTransaction for PgTransaction {
    async fn commit(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrateError::TransactionControl("Transaction already completed".to_string()))?;

        tx.commit()
            .await
            .map_err(|e| MigrateError::TransactionControl(format!("Transaction commit failed: {}", e)))?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> MigrateResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrateError::TransactionControl("Transaction already completed".to_string()))?;

        tx.rollback()
            .await
            .map_err(|e| MigrateError::TransactionControl(format!("Transaction rollback failed: {}", e)))?;
        debug!("Transaction rolled back");
        Ok(())
    }
}

/// Run one statement on any sqlx executor.
///
/// Row-producing statements report their row count, everything else reports
/// the number of affected rows.
async fn run_query<'c, E>(executor: E, query: &SqlQuery) -> MigrateResult<QueryOutput>
where
    E: Executor<'c, Database = Postgres>,
{
    let prepared = build_query(query);
    if returns_rows(&query.raw) {
        let rows = prepared
            .fetch_all(executor)
            .await
            .map_err(|e| MigrateError::query(&query.raw, e))?;
        rows_to_output(rows)
    } else {
        let result = prepared
            .execute(executor)
            .await
            .map_err(|e| MigrateError::query(&query.raw, e))?;
        Ok(QueryOutput::affected(result.rows_affected()))
    }
}

/// Run one statement without fetching its rows
async fn run_execute<'c, E>(executor: E, query: &SqlQuery) -> MigrateResult<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = build_query(query)
        .execute(executor)
        .await
        .map_err(|e| MigrateError::query(&query.raw, e))?;
    Ok(result.rows_affected())
}

fn returns_rows(raw: &str) -> bool {
    let head = raw.trim_start().to_ascii_uppercase();
    head.starts_with("SELECT") || head.starts_with("WITH") || head.contains(" RETURNING ")
}

fn build_query(query: &SqlQuery) -> Query<'_, Postgres, PgArguments> {
    query
        .values
        .iter()
        .fold(sqlx::query(&query.raw), bind_database_value)
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'a>(
    query: Query<'a, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> Query<'a, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

fn rows_to_output(rows: Vec<PgRow>) -> MigrateResult<QueryOutput> {
    let rows = rows
        .iter()
        .map(convert_row)
        .collect::<MigrateResult<Vec<_>>>()?;
    Ok(QueryOutput::with_rows(rows))
}

fn convert_row(row: &PgRow) -> MigrateResult<Row> {
    let mut converted = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        converted.push(column.name(), postgres_value_to_database_value(row, index)?);
    }
    Ok(converted)
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> MigrateResult<DatabaseValue> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    let decode_error = |e: sqlx::Error| {
        MigrateError::query(
            "<row>",
            format!("Failed to decode column '{}' ({}): {}", column.name(), type_name, e),
        )
    };

    let value: DatabaseValue = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map_err(decode_error)?
            .into(),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(decode_error)?
            .map(i32::from)
            .into(),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(decode_error)?
            .into(),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map_err(decode_error)?
            .into(),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map_err(decode_error)?
            .into(),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map_err(decode_error)?
            .into(),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map_err(decode_error)?
            .map(|naive| chrono::Utc.from_utc_datetime(&naive))
            .into(),
        "JSON" | "JSONB" => row
            .try_get::<Option<JsonValue>, _>(index)
            .map_err(decode_error)?
            .into(),
        _ => text_or_null(row.try_get::<Option<String>, _>(index), column.name(), type_name),
    };
    Ok(value)
}

/// Columns of types without a dedicated mapping (NUMERIC, UUID, VOID, ...)
/// are kept as text when they decode as such, and as `Null` otherwise.
fn text_or_null(
    decoded: Result<Option<String>, sqlx::Error>,
    column: &str,
    type_name: &str,
) -> DatabaseValue {
    match decoded {
        Ok(value) => value.into(),
        Err(e) => {
            debug!("Column '{}' ({}) has no text form, reading it as NULL: {}", column, type_name, e);
            DatabaseValue::Null
        }
    }
}
