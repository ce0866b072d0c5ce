//! Database Collaborator
//!
//! The migration engine does not manage connections itself. It consumes a
//! [`Database`] capability that can run single statements, open transactions
//! and answer a health probe. [`postgres::PgDatabase`] provides the sqlx
//! implementation used by the CLI.

pub mod postgres;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{MigrateError, MigrateResult};

pub use postgres::PgDatabase;

/// Trivial statement used to validate connectivity
pub const HEALTH_CHECK_QUERY: &str = "SELECT NOW();";

/// A raw SQL statement with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// Statement text, using `$1`-style placeholders
    pub raw: String,
    /// Values bound to the placeholders, in order
    pub values: Vec<DatabaseValue>,
}

impl SqlQuery {
    /// Create a statement without parameters
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            values: Vec::new(),
        }
    }

    /// Append a bound parameter
    pub fn bind(mut self, value: impl Into<DatabaseValue>) -> Self {
        self.values.push(value.into());
        self
    }
}

impl From<&str> for SqlQuery {
    fn from(raw: &str) -> Self {
        SqlQuery::new(raw)
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(chrono::DateTime<chrono::Utc>),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as i64),
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            DatabaseValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// A result row with named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, DatabaseValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column insertion
    pub fn with(mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Get a column value by name
    pub fn get_by_name(&self, name: &str) -> MigrateResult<&DatabaseValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
            .ok_or_else(|| MigrateError::query("<row>", format!("Column '{}' not found", name)))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Rows returned by a statement, plus the affected row count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub count: u64,
}

impl QueryOutput {
    /// Output of a statement that returns no rows
    pub fn affected(count: u64) -> Self {
        Self {
            rows: Vec::new(),
            count,
        }
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        let count = rows.len() as u64;
        Self { rows, count }
    }
}

/// Anything that can run one statement at a time
#[async_trait]
pub trait QueryExecutor: Send {
    /// Execute a single statement and return its rows and affected count
    async fn query(&mut self, query: &SqlQuery) -> MigrateResult<QueryOutput>;

    /// Execute a single statement, discarding any rows it produces.
    ///
    /// Returns the number of affected rows.
    async fn execute(&mut self, query: &SqlQuery) -> MigrateResult<u64> {
        Ok(self.query(query).await?.count)
    }
}

/// An open transaction
///
/// Statements run through [`QueryExecutor::query`] are part of the
/// transaction until it is committed or rolled back.
#[async_trait]
pub trait DatabaseTransaction: QueryExecutor {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrateResult<()>;
}

/// The database capability consumed by the migrator
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a single statement outside any transaction
    async fn query(&self, query: &SqlQuery) -> MigrateResult<QueryOutput>;

    /// Begin a transaction
    async fn begin(&self) -> MigrateResult<Box<dyn DatabaseTransaction>>;

    /// Run the health probe and report how long it took
    async fn health_check(&self) -> MigrateResult<Duration> {
        let start = std::time::Instant::now();
        self.query(&SqlQuery::new(HEALTH_CHECK_QUERY))
            .await
            .map_err(|e| MigrateError::Connection(format!("Health check failed: {}", e)))?;
        Ok(start.elapsed())
    }

    /// Release all connections
    async fn close(&self) -> MigrateResult<()>;
}

/// Runs statements straight on a [`Database`], each in its own implicit transaction
pub struct Autocommit<'a> {
    database: &'a dyn Database,
}

impl<'a> Autocommit<'a> {
    pub fn new(database: &'a dyn Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl<'a> QueryExecutor for Autocommit<'a> {
    async fn query(&mut self, query: &SqlQuery) -> MigrateResult<QueryOutput> {
        self.database.query(query).await
    }
}
