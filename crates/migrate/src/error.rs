//! Error types for the migration engine
//!
//! Every failure inside a transition aborts the enclosing transaction and is
//! surfaced to the caller through [`MigrateError`]. Nothing is retried.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error type for ledger, registry and transition operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The ledger table could not be created
    #[error("Schema error: {0}")]
    Schema(String),

    /// A single statement failed to execute
    #[error("Query error while running `{statement}`: {message}")]
    Query { statement: String, message: String },

    /// Opening, committing or rolling back a transaction failed.
    ///
    /// `source` is the error that caused the rollback when there was one.
    #[error("Transaction error: {message} (caused by: {source})")]
    Transaction {
        message: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Opening or committing a transaction failed with no prior cause
    #[error("Transaction error: {0}")]
    TransactionControl(String),

    /// Reconciliation left the ledger empty, the registry has no items
    #[error("No migration entries found")]
    NoEntries,

    /// `down` was requested while no migration is applied
    #[error("No pointer on any migration entry, nothing to revert")]
    NoPointerOnDown,

    /// The ledger references a title the registry does not declare
    #[error("No migration found for entry {title}")]
    MigrationNotFound { title: String },

    /// `set_pointer` matched no ledger row
    #[error("Cannot move pointer to {title}: no ledger entry has that title")]
    PointerTargetMissing { title: String },

    /// The registry itself is invalid
    #[error("Registry error: {0}")]
    Registry(String),

    /// A migration file could not be read or parsed
    #[error("Failed to load migration {}: {message}", path.display())]
    Loader { path: PathBuf, message: String },

    /// Pool creation or the health probe failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Build a query error for the given statement
    pub fn query(statement: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Query {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Build a loader error for the given file
    pub fn loader(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        MigrateError::Loader {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error reflects registry/ledger drift
    pub fn is_drift(&self) -> bool {
        matches!(self, MigrateError::MigrationNotFound { .. })
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                MigrateError::Connection(err.to_string())
            }
            other => MigrateError::query("<unknown>", other),
        }
    }
}

impl From<toml::de::Error> for MigrateError {
    fn from(err: toml::de::Error) -> Self {
        MigrateError::Configuration(err.to_string())
    }
}
