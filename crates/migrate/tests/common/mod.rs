//! In-memory database used by the integration tests
//!
//! Understands the ledger statements and the health probe. Every other
//! statement is treated as a migration body and recorded. Transactions work
//! on a copy of the state that is written back on commit.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use matchbox_migrate::database::HEALTH_CHECK_QUERY;
use matchbox_migrate::ledger::{
    CLEAR_POINTER_SQL, CREATE_TABLE_SQL, INSERT_ENTRY_SQL, SELECT_ENTRIES_SQL, SET_POINTER_SQL,
};
use matchbox_migrate::{
    Database, DatabaseTransaction, DatabaseValue, MigrateError, MigrateResult, MigrationItem,
    QueryExecutor, QueryOutput, Registry, Row, SqlQuery,
};

pub const USERS: &str = "2024-01-01T00:00:00.000Z_createUsers";
pub const EMAIL: &str = "2024-01-02T00:00:00.000Z_addEmail";
pub const INDEX: &str = "2024-01-03T00:00:00.000Z_indexEmail";

/// Registry whose items create and drop a table named after their title
pub fn registry(titles: &[&str]) -> Registry {
    let items = titles
        .iter()
        .map(|title| MigrationItem::new(*title, up_sql(title).as_str(), down_sql(title).as_str()))
        .collect();
    Registry::new(items).unwrap()
}

pub fn up_sql(title: &str) -> String {
    format!("CREATE TABLE \"{}\" (id INT);", title)
}

pub fn down_sql(title: &str) -> String {
    format!("DROP TABLE \"{}\";", title)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockRow {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub pointer: bool,
}

#[derive(Debug, Clone, Default)]
struct MockState {
    table_exists: bool,
    next_id: i32,
    rows: Vec<MockRow>,
    executed: Vec<String>,
    fetched: Vec<String>,
}

impl MockState {
    fn run(&mut self, query: &SqlQuery, fetch_rows: bool) -> MigrateResult<QueryOutput> {
        let raw = query.raw.as_str();

        if raw == HEALTH_CHECK_QUERY {
            return Ok(QueryOutput::with_rows(vec![Row::new().with("now", Utc::now())]));
        }
        if raw == CREATE_TABLE_SQL {
            self.table_exists = true;
            return Ok(QueryOutput::affected(0));
        }
        if raw == SELECT_ENTRIES_SQL || raw == INSERT_ENTRY_SQL || raw == CLEAR_POINTER_SQL || raw == SET_POINTER_SQL {
            if !self.table_exists {
                return Err(MigrateError::query(raw, "relation \"migrations\" does not exist"));
            }
        }

        if raw == SELECT_ENTRIES_SQL {
            // Reverse insertion order, callers must sort
            let rows = self
                .rows
                .iter()
                .rev()
                .map(|row| {
                    Row::new()
                        .with("id", row.id)
                        .with("title", row.title.as_str())
                        .with("description", row.description.clone())
                        .with("createdAt", Utc::now())
                        .with("pointer", row.pointer)
                })
                .collect();
            return Ok(QueryOutput::with_rows(rows));
        }
        if raw == INSERT_ENTRY_SQL {
            let title = bound_str(query, 0)?.unwrap_or_default();
            let description = bound_str(query, 1)?;
            self.next_id += 1;
            self.rows.push(MockRow {
                id: self.next_id,
                title,
                description,
                pointer: false,
            });
            return Ok(QueryOutput::affected(1));
        }
        if raw == CLEAR_POINTER_SQL {
            for row in &mut self.rows {
                row.pointer = false;
            }
            return Ok(QueryOutput::affected(self.rows.len() as u64));
        }
        if raw == SET_POINTER_SQL {
            let title = bound_str(query, 0)?.unwrap_or_default();
            let mut count = 0;
            for row in self.rows.iter_mut().filter(|row| row.title == title) {
                row.pointer = true;
                count += 1;
            }
            return Ok(QueryOutput::affected(count));
        }

        self.executed.push(raw.to_string());
        if fetch_rows {
            self.fetched.push(raw.to_string());
        }
        Ok(QueryOutput::affected(0))
    }
}

fn bound_str(query: &SqlQuery, index: usize) -> MigrateResult<Option<String>> {
    match query.values.get(index) {
        Some(DatabaseValue::String(value)) => Ok(Some(value.clone())),
        Some(DatabaseValue::Null) => Ok(None),
        other => Err(MigrateError::query(
            query.raw.as_str(),
            format!("unexpected parameter ${}: {:?}", index + 1, other),
        )),
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<MockState>,
    fail_on: Mutex<Option<String>>,
    fail_rollback: AtomicBool,
    fail_health_check: AtomicBool,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closed: AtomicBool,
}

impl Shared {
    fn run(&self, state: &mut MockState, query: &SqlQuery, fetch_rows: bool) -> MigrateResult<QueryOutput> {
        if self.should_fail(&query.raw) {
            return Err(MigrateError::query(query.raw.as_str(), "injected failure"));
        }
        state.run(query, fetch_rows)
    }

    fn should_fail(&self, raw: &str) -> bool {
        if raw == HEALTH_CHECK_QUERY && self.fail_health_check.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_on
            .lock()
            .unwrap()
            .as_deref()
            .map_or(false, |needle| raw.contains(needle))
    }
}

/// In-memory stand-in for PostgreSQL
#[derive(Clone, Default)]
pub struct MockDatabase {
    shared: Arc<Shared>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock whose ledger table already holds `rows` (title, pointer)
    pub fn with_ledger(rows: &[(&str, bool)]) -> Self {
        let database = Self::new();
        {
            let mut state = database.shared.state.lock().unwrap();
            state.table_exists = true;
            for (title, pointer) in rows {
                state.next_id += 1;
                let id = state.next_id;
                state.rows.push(MockRow {
                    id,
                    title: title.to_string(),
                    description: None,
                    pointer: *pointer,
                });
            }
        }
        database
    }

    /// Fail every statement containing `needle`
    pub fn fail_on(&self, needle: &str) {
        *self.shared.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    pub fn clear_failure(&self) {
        *self.shared.fail_on.lock().unwrap() = None;
    }

    pub fn fail_rollback(&self) {
        self.shared.fail_rollback.store(true, Ordering::SeqCst);
    }

    pub fn fail_health_check(&self) {
        self.shared.fail_health_check.store(true, Ordering::SeqCst);
    }

    pub fn table_exists(&self) -> bool {
        self.shared.state.lock().unwrap().table_exists
    }

    /// Committed ledger rows in title order
    pub fn rows(&self) -> Vec<MockRow> {
        let mut rows = self.shared.state.lock().unwrap().rows.clone();
        rows.sort_by(|a, b| a.title.cmp(&b.title));
        rows
    }

    pub fn titles(&self) -> Vec<String> {
        self.rows().into_iter().map(|row| row.title).collect()
    }

    /// Titles carrying the pointer
    pub fn pointers(&self) -> Vec<String> {
        self.rows()
            .into_iter()
            .filter(|row| row.pointer)
            .map(|row| row.title)
            .collect()
    }

    pub fn pointer(&self) -> Option<String> {
        self.pointers().into_iter().next()
    }

    /// Committed migration bodies, in execution order
    pub fn executed(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().executed.clone()
    }

    /// Committed migration bodies that were sent through `query` and had
    /// their rows decoded
    pub fn fetched(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().fetched.clone()
    }

    pub fn begins(&self) -> usize {
        self.shared.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn query(&self, query: &SqlQuery) -> MigrateResult<QueryOutput> {
        let mut state = self.shared.state.lock().unwrap();
        self.shared.run(&mut state, query, true)
    }

    async fn begin(&self) -> MigrateResult<Box<dyn DatabaseTransaction>> {
        self.shared.begins.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.shared.state.lock().unwrap().clone();
        Ok(Box::new(MockTransaction {
            shared: Arc::clone(&self.shared),
            state: snapshot,
        }))
    }

    async fn close(&self) -> MigrateResult<()> {
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockTransaction {
    shared: Arc<Shared>,
    state: MockState,
}

#[async_trait]
impl QueryExecutor for MockTransaction {
    async fn query(&mut self, query: &SqlQuery) -> MigrateResult<QueryOutput> {
        self.shared.run(&mut self.state, query, true)
    }

    async fn execute(&mut self, query: &SqlQuery) -> MigrateResult<u64> {
        Ok(self.shared.run(&mut self.state, query, false)?.count)
    }
}

#[async_trait]
impl DatabaseTransaction for MockTransaction {
    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        let MockTransaction { shared, state } = *self;
        shared.commits.fetch_add(1, Ordering::SeqCst);
        *shared.state.lock().unwrap() = state;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_rollback.load(Ordering::SeqCst) {
            return Err(MigrateError::TransactionControl("connection reset during rollback".to_string()));
        }
        Ok(())
    }
}
