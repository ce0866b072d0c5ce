//! Ledger Store
//!
//! CRUD over the `migrations` tracking table. The table layout is fixed so
//! existing ledgers stay readable:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS migrations (
//!   id SERIAL PRIMARY KEY,
//!   title TEXT NOT NULL,
//!   description TEXT,
//!   "createdAt" TIMESTAMP DEFAULT NOW(),
//!   pointer BOOLEAN DEFAULT false);
//! ```
//!
//! Every function takes the executor it should run on, so callers decide
//! whether the work happens inside a transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::database::{QueryExecutor, Row, SqlQuery};
use crate::error::{MigrateError, MigrateResult};
use crate::logging::MigrationLogger;
use crate::registry::{name_fragment, Registry};

pub const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS migrations (\n    \
    id SERIAL PRIMARY KEY,\n    \
    title TEXT NOT NULL,\n    \
    description TEXT,\n    \
    \"createdAt\" TIMESTAMP DEFAULT NOW(),\n    \
    pointer BOOLEAN DEFAULT false);";

pub const SELECT_ENTRIES_SQL: &str =
    "SELECT id, title, description, \"createdAt\", pointer FROM migrations;";

pub const INSERT_ENTRY_SQL: &str = "INSERT INTO migrations (title, description) VALUES ($1, $2);";

pub const CLEAR_POINTER_SQL: &str = "UPDATE migrations SET pointer = false;";

pub const SET_POINTER_SQL: &str = "UPDATE migrations SET pointer = true WHERE title = $1;";

/// One row of the ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationEntry {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// When the row was inserted, not when the migration was written
    pub created_at: Option<DateTime<Utc>>,
    pub pointer: bool,
}

impl MigrationEntry {
    fn from_row(row: &Row) -> MigrateResult<Self> {
        let id = row
            .get_by_name("id")?
            .as_i64()
            .ok_or_else(|| MigrateError::query(SELECT_ENTRIES_SQL, "column 'id' is not an integer"))?;
        let title = row
            .get_by_name("title")?
            .as_str()
            .ok_or_else(|| MigrateError::query(SELECT_ENTRIES_SQL, "column 'title' is not text"))?
            .to_string();
        let description = row.get_by_name("description")?.as_str().map(str::to_string);
        let created_at = row.get_by_name("createdAt")?.as_datetime();
        let pointer = row.get_by_name("pointer")?.as_bool().unwrap_or(false);

        Ok(Self {
            id,
            title,
            description,
            created_at,
            pointer,
        })
    }
}

/// Create the ledger table if it does not exist yet
pub async fn ensure_schema<E: QueryExecutor + ?Sized>(executor: &mut E) -> MigrateResult<()> {
    executor
        .query(&SqlQuery::new(CREATE_TABLE_SQL))
        .await
        .map_err(|e| MigrateError::Schema(format!("Failed to create migrations table: {}", e)))?;
    Ok(())
}

/// All ledger rows, ordered by title
pub async fn list_entries<E: QueryExecutor + ?Sized>(executor: &mut E) -> MigrateResult<Vec<MigrationEntry>> {
    let output = executor.query(&SqlQuery::new(SELECT_ENTRIES_SQL)).await?;
    let mut entries = output
        .rows
        .iter()
        .map(MigrationEntry::from_row)
        .collect::<MigrateResult<Vec<_>>>()?;

    // Byte-wise order, independent of the database collation
    entries.sort_by(|a, b| a.title.cmp(&b.title));
    Ok(entries)
}

/// Append a ledger row for `title` with no pointer
pub async fn insert_entry<E: QueryExecutor + ?Sized>(executor: &mut E, title: &str) -> MigrateResult<()> {
    let query = SqlQuery::new(INSERT_ENTRY_SQL)
        .bind(title)
        .bind(describe_title(title));
    executor.query(&query).await?;
    Ok(())
}

/// Move the pointer to the row titled `title`.
///
/// Clears every pointer first. When no row has that title the call fails
/// with [`MigrateError::PointerTargetMissing`]; the clear has then already
/// run, so callers must be inside a transaction that will roll it back.
pub async fn set_pointer<E: QueryExecutor + ?Sized>(executor: &mut E, title: &str) -> MigrateResult<()> {
    executor.query(&SqlQuery::new(CLEAR_POINTER_SQL)).await?;

    let output = executor
        .query(&SqlQuery::new(SET_POINTER_SQL).bind(title))
        .await?;
    if output.count == 0 {
        return Err(MigrateError::PointerTargetMissing {
            title: title.to_string(),
        });
    }
    Ok(())
}

/// Insert a ledger row for every registry item that lacks one.
///
/// Returns how many rows were inserted. Never deletes rows.
pub async fn reconcile<E: QueryExecutor + ?Sized>(
    executor: &mut E,
    registry: &Registry,
    logger: &dyn MigrationLogger,
) -> MigrateResult<usize> {
    let entries = list_entries(executor).await?;
    let known: HashSet<&str> = entries.iter().map(|entry| entry.title.as_str()).collect();

    let mut inserted = 0;
    for item in registry.items() {
        if known.contains(item.title.as_str()) {
            continue;
        }
        insert_entry(executor, &item.title).await?;
        logger.debug(&format!("Registered ledger entry {}", item.title));
        inserted += 1;
    }

    if inserted > 0 {
        logger.info(&format!("Registered {} new migration(s) in the ledger", inserted));
    }
    Ok(inserted)
}

/// Human-readable description of a title's name fragment.
///
/// `2024-01-01T00:00:00.000Z_createUsers` becomes `Create Users`.
pub fn describe_title(title: &str) -> Option<String> {
    let name = name_fragment(title);
    if name.is_empty() {
        return None;
    }

    let mut description = String::with_capacity(name.len() + 4);
    for (index, ch) in name.chars().enumerate() {
        if index > 0 && ch.is_uppercase() {
            description.push(' ');
        }
        if index == 0 {
            description.extend(ch.to_uppercase());
        } else {
            description.push(ch);
        }
    }
    Some(description)
}
