//! Registry Loader
//!
//! Builds a [`Registry`] from a directory of `.sql` migration files. A file is
//! picked up when its name starts with a migration title
//! (`2024-01-01T00:00:00.000Z_createUsers.sql`); everything else is skipped.
//!
//! Each file carries two sections:
//!
//! ```sql
//! -- Up migration
//! CREATE TABLE users (id SERIAL PRIMARY KEY);
//!
//! -- Down migration
//! DROP TABLE users;
//! ```

pub mod scaffold;

use regex::Regex;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::fs;
use std::path::Path;

use crate::error::{MigrateError, MigrateResult};
use crate::registry::{MigrationItem, Registry, TITLE_PATTERN};

pub const UP_MARKER: &str = "-- Up migration";
pub const DOWN_MARKER: &str = "-- Down migration";

/// Recognizes migration file names
pub struct FileNameMatcher {
    pattern: Regex,
}

impl FileNameMatcher {
    pub fn new() -> MigrateResult<Self> {
        let pattern = Regex::new(TITLE_PATTERN)
            .map_err(|e| MigrateError::Configuration(format!("Invalid migration file pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Whether `file_name` starts with a migration title
    pub fn matches(&self, file_name: &str) -> bool {
        self.pattern.is_match(file_name)
    }

    /// A regular `.sql` file whose name starts with a migration title
    pub fn is_migration_file(&self, path: &Path) -> bool {
        let has_sql_extension = path.extension().map_or(false, |ext| ext == "sql");
        let matches_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| self.matches(name));
        path.is_file() && has_sql_extension && matches_name
    }
}

/// Load every migration file in `dir` into a registry
pub fn load_registry(dir: impl AsRef<Path>) -> MigrateResult<Registry> {
    let dir = dir.as_ref();
    let matcher = FileNameMatcher::new()?;
    let entries = fs::read_dir(dir)
        .map_err(|e| MigrateError::loader(dir, format!("Failed to read migrations directory: {}", e)))?;

    let mut items = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| MigrateError::loader(dir, e))?.path();
        if !matcher.is_migration_file(&path) {
            continue;
        }
        items.push(load_migration_file(&path)?);
    }

    tracing::debug!("Loaded {} migration(s) from {}", items.len(), dir.display());
    Registry::new(items)
}

/// Parse a single migration file. The title is the file stem.
pub fn load_migration_file(path: &Path) -> MigrateResult<MigrationItem> {
    let title = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| MigrateError::loader(path, "Invalid migration file name"))?
        .to_string();

    let content = fs::read_to_string(path).map_err(|e| MigrateError::loader(path, e))?;
    let (up, down) = parse_sections(&content).map_err(|message| MigrateError::loader(path, message))?;

    check_single_statement(&up).map_err(|message| MigrateError::loader(path, format!("up: {}", message)))?;
    check_single_statement(&down).map_err(|message| MigrateError::loader(path, format!("down: {}", message)))?;

    Ok(MigrationItem::new(title, up.as_str(), down.as_str()))
}

/// Split file content into its up and down statements
pub fn parse_sections(content: &str) -> Result<(String, String), String> {
    #[derive(PartialEq)]
    enum Section {
        Preamble,
        Up,
        Down,
    }

    let mut section = Section::Preamble;
    let mut up = Vec::new();
    let mut down = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case(UP_MARKER) {
            section = Section::Up;
            continue;
        }
        if trimmed.eq_ignore_ascii_case(DOWN_MARKER) {
            section = Section::Down;
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        match section {
            Section::Up => up.push(line),
            Section::Down => down.push(line),
            Section::Preamble => {}
        }
    }

    let up = up.join("\n").trim().to_string();
    let down = down.join("\n").trim().to_string();
    if up.is_empty() {
        return Err(format!("missing statement under '{}'", UP_MARKER));
    }
    if down.is_empty() {
        return Err(format!("missing statement under '{}'", DOWN_MARKER));
    }
    Ok((up, down))
}

/// A migration body is run as one statement.
///
/// SQL the parser does not understand is let through, the database is the
/// final judge.
fn check_single_statement(sql: &str) -> Result<(), String> {
    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) if statements.len() == 1 => Ok(()),
        Ok(statements) => Err(format!("expected exactly one statement, found {}", statements.len())),
        Err(e) => {
            tracing::warn!("SQL parsing failed, running statement as written: {}", e);
            Ok(())
        }
    }
}
