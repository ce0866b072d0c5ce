//! # matchbox-migrate: Pointer-based PostgreSQL migrations
//!
//! Keeps a persisted ledger of known migrations in a `migrations` table, with
//! a single boolean pointer marking the most recently applied one. The
//! [`Migrator`] moves that pointer forward (`up`), backward (`down`) or to
//! the end (`sync_all`), each transition inside one database transaction.
//!
//! Migrations are declared up front in a [`Registry`], usually loaded from a
//! folder of `.sql` files with [`load_registry`].

pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod logging;
pub mod migrator;
pub mod registry;

// Re-export the types callers reach for first
pub use config::{mask_database_url, DatabaseConfig, DATABASE_URL_ENV};
pub use database::{
    Autocommit, Database, DatabaseTransaction, DatabaseValue, PgDatabase, QueryExecutor,
    QueryOutput, Row, SqlQuery,
};
pub use error::{MigrateError, MigrateResult};
pub use ledger::MigrationEntry;
pub use loader::load_registry;
pub use loader::scaffold::{create_migration, to_camel_case, write_config_template};
pub use logging::{CapturingLogger, LogLevel, MigrationLogger, NoopLogger, TracingLogger};
pub use migrator::{MigrationStatus, Migrator, SyncReport, Transition};
pub use registry::{MigrationItem, Registry};
