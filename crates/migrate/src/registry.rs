//! Migration Registry
//!
//! The ordered, immutable set of migrations a caller declares. The registry is
//! built once (usually by [`crate::loader::load_registry`]) and injected into
//! the [`crate::Migrator`]; the engine never discovers migrations on its own.

use regex::Regex;
use std::collections::HashSet;

use crate::database::SqlQuery;
use crate::error::{MigrateError, MigrateResult};

/// Shape of a migration title: an ISO-8601 UTC timestamp with milliseconds,
/// `_`, then a camel-cased name. File names start with a title.
pub(crate) const TITLE_PATTERN: &str =
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z+_[a-z]+((\d)|([A-Z0-9][a-z0-9]+))*([A-Z])?";

/// One declared unit of schema change
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationItem {
    /// Timestamp-prefixed unique title, e.g. `2024-01-01T00:00:00.000Z_createUsers`.
    /// Lexical order of titles is chronological order.
    pub title: String,
    /// Statement applying the change
    pub up: SqlQuery,
    /// Statement reverting the change
    pub down: SqlQuery,
}

impl MigrationItem {
    pub fn new(title: impl Into<String>, up: impl Into<SqlQuery>, down: impl Into<SqlQuery>) -> Self {
        Self {
            title: title.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    /// Name part of the title, after the first `_`
    pub fn name(&self) -> &str {
        name_fragment(&self.title)
    }
}

/// Name part of a migration title, after the first `_`
pub fn name_fragment(title: &str) -> &str {
    title.split_once('_').map(|(_, name)| name).unwrap_or_default()
}

/// Title-ordered collection of migration items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    items: Vec<MigrationItem>,
}

impl Registry {
    /// Build a registry, sorting items by title.
    ///
    /// Fails when a title is empty, malformed or declared twice.
    pub fn new(mut items: Vec<MigrationItem>) -> MigrateResult<Self> {
        let pattern = Regex::new(TITLE_PATTERN)
            .map_err(|e| MigrateError::Registry(format!("Invalid title pattern: {}", e)))?;

        let mut seen = HashSet::new();
        for item in &items {
            if item.title.trim().is_empty() {
                return Err(MigrateError::Registry("Migration title must not be empty".to_string()));
            }
            if !pattern.is_match(&item.title) {
                return Err(MigrateError::Registry(format!(
                    "Migration title {} does not start with <timestamp>_<camelCaseName>",
                    item.title
                )));
            }
            if !seen.insert(item.title.as_str()) {
                return Err(MigrateError::Registry(format!(
                    "Migration {} is declared more than once",
                    item.title
                )));
            }
        }

        items.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(Self { items })
    }

    /// Items in title order
    pub fn items(&self) -> &[MigrationItem] {
        &self.items
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.title.as_str())
    }

    /// Look up an item by its exact title
    pub fn get(&self, title: &str) -> Option<&MigrationItem> {
        self.items
            .binary_search_by(|item| item.title.as_str().cmp(title))
            .ok()
            .map(|index| &self.items[index])
    }

    /// Like [`get`](Self::get), but a missing title is registry/ledger drift
    pub fn require(&self, title: &str) -> MigrateResult<&MigrationItem> {
        self.get(title).ok_or_else(|| MigrateError::MigrationNotFound {
            title: title.to_string(),
        })
    }

    pub fn contains(&self, title: &str) -> bool {
        self.get(title).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
