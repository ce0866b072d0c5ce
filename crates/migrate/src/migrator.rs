//! Transition Engine
//!
//! Drives the ledger pointer forward (`up`), backward (`down`) and to the end
//! of the registry (`sync_all`). Each public transition runs in exactly one
//! database transaction: reconciliation, reads, the migration body and the
//! pointer update either all commit or all roll back.
//!
//! Planning is separated from I/O. [`plan_up`], [`plan_down`] and
//! [`sync_all_attempts`] only look at the title-sorted ledger entries; the
//! [`Migrator`] executes what they decide.
//!
//! `sync_all` repeats the transaction-free `up` step inside its own single
//! transaction instead of nesting transactions, so a failure on any step
//! undoes every step taken during that call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::database::{Autocommit, Database, DatabaseTransaction};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::{self, MigrationEntry};
use crate::logging::{MigrationLogger, TracingLogger};
use crate::registry::Registry;

/// Position of the pointer within the title-sorted ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// No entry is marked, nothing has been applied
    Unset,
    /// Index of the marked entry
    At(usize),
}

impl Cursor {
    /// Locate the first marked entry
    pub fn locate(entries: &[MigrationEntry]) -> Self {
        entries
            .iter()
            .position(|entry| entry.pointer)
            .map(Cursor::At)
            .unwrap_or(Cursor::Unset)
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Cursor::Unset => None,
            Cursor::At(index) => Some(*index),
        }
    }
}

/// What an `up` step should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpPlan {
    /// Run the `up` body of `title` and point at it
    Apply { title: String },
    /// The pointer is already on the last entry
    UpToDate,
}

/// What a `down` step should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownPlan {
    /// Run the `down` body of `title` (the current entry), then point at `pointer`
    Revert { title: String, pointer: String },
    /// The pointer is on the first entry
    DownToDate,
}

/// Decide the next forward move
pub fn plan_up(entries: &[MigrationEntry]) -> MigrateResult<UpPlan> {
    if entries.is_empty() {
        return Err(MigrateError::NoEntries);
    }

    let next = match Cursor::locate(entries) {
        Cursor::Unset => 0,
        Cursor::At(index) if index + 1 >= entries.len() => return Ok(UpPlan::UpToDate),
        Cursor::At(index) => index + 1,
    };

    Ok(UpPlan::Apply {
        title: entries[next].title.clone(),
    })
}

/// Decide the next backward move
pub fn plan_down(entries: &[MigrationEntry]) -> MigrateResult<DownPlan> {
    if entries.is_empty() {
        return Err(MigrateError::NoEntries);
    }

    match Cursor::locate(entries) {
        Cursor::Unset => Err(MigrateError::NoPointerOnDown),
        Cursor::At(0) => Ok(DownPlan::DownToDate),
        Cursor::At(index) => Ok(DownPlan::Revert {
            title: entries[index].title.clone(),
            pointer: entries[index - 1].title.clone(),
        }),
    }
}

/// Number of `up` steps `sync_all` takes.
///
/// `registry_len - current_index`, with `current_index = -1` when nothing is
/// applied. This can exceed the real distance to the end; the surplus steps
/// are up-to-date no-ops.
pub fn sync_all_attempts(registry_len: usize, cursor: Cursor) -> usize {
    match cursor {
        Cursor::Unset => registry_len + 1,
        Cursor::At(index) => registry_len.saturating_sub(index),
    }
}

/// Outcome of a single `up` or `down` step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    Applied { title: String },
    UpToDate,
    Reverted { title: String, pointer: String },
    DownToDate,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Applied { title } => write!(f, "Applied {}", title),
            Transition::UpToDate => write!(f, "All migrations are up to date"),
            Transition::Reverted { title, pointer } => {
                write!(f, "Reverted {}, pointer now on {}", title, pointer)
            }
            Transition::DownToDate => write!(f, "All migrations are down to date"),
        }
    }
}

/// Result of `sync_all`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Number of `up` steps attempted
    pub attempts: usize,
    /// Titles applied, in order
    pub applied: Vec<String>,
}

/// One line of `status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub title: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// The ledger has a row for this title
    pub registered: bool,
    /// The registry declares this title
    pub declared: bool,
    /// At or before the pointer
    pub applied: bool,
    /// Carries the pointer
    pub current: bool,
}

/// Migration state object: the registry, the database it migrates and a logger
pub struct Migrator {
    registry: Registry,
    database: Arc<dyn Database>,
    logger: Arc<dyn MigrationLogger>,
}

impl Migrator {
    /// Create a migrator logging through `tracing`
    pub fn new(registry: Registry, database: Arc<dyn Database>) -> Self {
        Self {
            registry,
            database,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Replace the logger
    pub fn with_logger(mut self, logger: Arc<dyn MigrationLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    /// Probe connectivity, then create the ledger table if needed
    pub async fn init(&self) -> MigrateResult<()> {
        let elapsed = self.database.health_check().await.map_err(|e| {
            self.logger.error(&format!("Health check failed: {}", e));
            e
        })?;
        self.logger
            .debug(&format!("Health check passed in {}ms", elapsed.as_millis()));

        ledger::ensure_schema(&mut Autocommit::new(self.database.as_ref())).await?;
        self.logger.debug("Ledger table is ready");
        Ok(())
    }

    /// Release the database connections
    pub async fn finish(&self) -> MigrateResult<()> {
        self.database.close().await
    }

    /// Apply the next migration
    pub async fn up(&self) -> MigrateResult<Transition> {
        let mut tx = self.database.begin().await?;
        let result = self.step_up(tx.as_mut()).await;
        self.settle(tx, result).await
    }

    /// Revert the current migration
    pub async fn down(&self) -> MigrateResult<Transition> {
        let mut tx = self.database.begin().await?;
        let result = self.step_down(tx.as_mut()).await;
        self.settle(tx, result).await
    }

    /// Apply every remaining migration in one transaction
    pub async fn sync_all(&self) -> MigrateResult<SyncReport> {
        let mut tx = self.database.begin().await?;
        let result = self.sync_steps(tx.as_mut()).await;
        self.settle(tx, result).await
    }

    /// Ledger entries merged with the registry, in title order.
    ///
    /// Read-only: registry items without a ledger row are listed as
    /// unregistered instead of being inserted.
    pub async fn status(&self) -> MigrateResult<Vec<MigrationStatus>> {
        let entries = ledger::list_entries(&mut Autocommit::new(self.database.as_ref())).await?;
        let cursor = Cursor::locate(&entries);

        let mut statuses: Vec<MigrationStatus> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| MigrationStatus {
                title: entry.title.clone(),
                description: entry.description.clone(),
                created_at: entry.created_at,
                registered: true,
                declared: self.registry.contains(&entry.title),
                applied: cursor.index().map_or(false, |current| index <= current),
                current: cursor == Cursor::At(index),
            })
            .collect();

        for item in self.registry.items() {
            if entries.iter().any(|entry| entry.title == item.title) {
                continue;
            }
            statuses.push(MigrationStatus {
                title: item.title.clone(),
                description: ledger::describe_title(&item.title),
                created_at: None,
                registered: false,
                declared: true,
                applied: false,
                current: false,
            });
        }

        statuses.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(statuses)
    }

    async fn sync_steps(&self, tx: &mut dyn DatabaseTransaction) -> MigrateResult<SyncReport> {
        ledger::reconcile(tx, &self.registry, self.logger.as_ref()).await?;
        let entries = ledger::list_entries(tx).await?;
        let attempts = sync_all_attempts(self.registry.len(), Cursor::locate(&entries));
        self.logger
            .debug(&format!("Syncing with {} up step(s)", attempts));

        let mut report = SyncReport {
            attempts,
            applied: Vec::new(),
        };
        for _ in 0..attempts {
            if let Transition::Applied { title } = self.step_up(tx).await? {
                report.applied.push(title);
            }
        }

        self.logger.info(&format!(
            "Sync complete, {} migration(s) applied",
            report.applied.len()
        ));
        Ok(report)
    }

    async fn step_up(&self, tx: &mut dyn DatabaseTransaction) -> MigrateResult<Transition> {
        let entries = self.prepare(tx).await?;

        match plan_up(&entries)? {
            UpPlan::UpToDate => {
                self.logger.info("All migrations are up to date");
                Ok(Transition::UpToDate)
            }
            UpPlan::Apply { title } => {
                let item = self.registry.require(&title)?;
                self.logger.info(&format!("Applying {}", title));
                tx.execute(&item.up).await?;
                ledger::set_pointer(tx, &title).await?;
                Ok(Transition::Applied { title })
            }
        }
    }

    async fn step_down(&self, tx: &mut dyn DatabaseTransaction) -> MigrateResult<Transition> {
        let entries = self.prepare(tx).await?;

        match plan_down(&entries)? {
            DownPlan::DownToDate => {
                self.logger.info("All migrations are down to date");
                Ok(Transition::DownToDate)
            }
            DownPlan::Revert { title, pointer } => {
                let item = self.registry.require(&title)?;
                self.logger.info(&format!("Reverting {}", title));
                tx.execute(&item.down).await?;
                ledger::set_pointer(tx, &pointer).await?;
                Ok(Transition::Reverted { title, pointer })
            }
        }
    }

    /// Reconcile, then load the sorted entries
    async fn prepare(&self, tx: &mut dyn DatabaseTransaction) -> MigrateResult<Vec<MigrationEntry>> {
        ledger::reconcile(tx, &self.registry, self.logger.as_ref()).await?;
        let entries = ledger::list_entries(tx).await?;

        let marked = entries.iter().filter(|entry| entry.pointer).count();
        if marked > 1 {
            self.logger.warn(&format!(
                "{} ledger entries carry the pointer, using the first in title order",
                marked
            ));
        }
        Ok(entries)
    }

    /// Commit on success, roll back on failure and hand back the original error
    async fn settle<T>(
        &self,
        tx: Box<dyn DatabaseTransaction>,
        result: MigrateResult<T>,
    ) -> MigrateResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                self.logger.error(&format!("Transaction failed: {}", err));
                match tx.rollback().await {
                    Ok(()) => Err(err),
                    Err(rollback_err) => Err(MigrateError::Transaction {
                        message: rollback_err.to_string(),
                        source: Box::new(err),
                    }),
                }
            }
        }
    }
}
