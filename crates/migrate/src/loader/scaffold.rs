//! Scaffolding for new migration files and database folders

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use super::{FileNameMatcher, DOWN_MARKER, UP_MARKER};
use crate::config::DatabaseConfig;
use crate::error::{MigrateError, MigrateResult};

/// File name of the config written by [`write_config_template`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Camel-case a free-form name: `create users table` becomes `createUsersTable`.
///
/// The first character is lowercased, the first character of every later word
/// is uppercased, existing capitals are kept and whitespace is removed.
pub fn to_camel_case(name: &str) -> String {
    let is_word = |ch: char| ch.is_alphanumeric() || ch == '_';

    let mut camel = String::with_capacity(name.len());
    let mut previous: Option<char> = None;
    for ch in name.chars() {
        let at_word_start = is_word(ch) && !previous.map_or(false, is_word);
        if previous.is_none() && is_word(ch) {
            camel.extend(ch.to_lowercase());
        } else if at_word_start {
            camel.extend(ch.to_uppercase());
        } else if !ch.is_whitespace() {
            camel.push(ch);
        }
        previous = Some(ch);
    }
    camel
}

/// Title for a migration named `name` created at `now`
pub fn migration_file_name(name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        now.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        to_camel_case(name.trim())
    )
}

fn migration_template(title: &str, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {}\n\
         -- Created: {}\n\n\
         {}\n\
         -- Write the statement applying the change here\n\n\n\
         {}\n\
         -- Write the statement reverting the change here\n\n",
        title,
        now.format("%Y-%m-%d %H:%M:%S UTC"),
        UP_MARKER,
        DOWN_MARKER
    )
}

/// Write an empty migration file named after `name` into `dir`
pub fn create_migration(dir: impl AsRef<Path>, name: &str) -> MigrateResult<PathBuf> {
    create_migration_at(dir, name, Utc::now())
}

/// [`create_migration`] with an explicit creation time
pub fn create_migration_at(
    dir: impl AsRef<Path>,
    name: &str,
    now: DateTime<Utc>,
) -> MigrateResult<PathBuf> {
    let dir = dir.as_ref();
    let title = migration_file_name(name, now);
    if !FileNameMatcher::new()?.matches(&title) {
        return Err(MigrateError::Registry(format!(
            "'{}' does not produce a valid migration title ({})",
            name, title
        )));
    }

    fs::create_dir_all(dir)
        .map_err(|e| MigrateError::loader(dir, format!("Failed to create migrations directory: {}", e)))?;

    let path = dir.join(format!("{}.sql", title));
    fs::write(&path, migration_template(&title, now)).map_err(|e| MigrateError::loader(&path, e))?;

    tracing::info!("Created migration {}", path.display());
    Ok(path)
}

/// Create `dir` if needed and write a config template for `database` into it
pub fn write_config_template(dir: impl AsRef<Path>, database: &str) -> MigrateResult<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .map_err(|e| MigrateError::loader(dir, format!("Failed to create database directory: {}", e)))?;

    let path = dir.join(CONFIG_FILE_NAME);
    fs::write(&path, DatabaseConfig::template(database)).map_err(|e| MigrateError::loader(&path, e))?;

    tracing::info!("Wrote config template {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_migration_file, parse_sections};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap() + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("create users table"), "createUsersTable");
        assert_eq!(to_camel_case("Add email"), "addEmail");
        assert_eq!(to_camel_case("addEmailIndex"), "addEmailIndex");
        assert_eq!(to_camel_case("drop  legacy   rows"), "dropLegacyRows");
    }

    #[test]
    fn test_migration_file_name() {
        assert_eq!(
            migration_file_name("create users", fixed_now()),
            "2024-03-05T14:07:09.042Z_createUsers"
        );
    }

    #[test]
    fn test_created_migration_is_discoverable() {
        let dir = TempDir::new().unwrap();
        let path = create_migration_at(dir.path(), "create users", fixed_now()).unwrap();

        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("2024-03-05T14:07:09.042Z_createUsers.sql")
        );
        assert!(FileNameMatcher::new().unwrap().is_migration_file(&path));

        // An untouched template has no statements yet
        let content = fs::read_to_string(&path).unwrap();
        assert!(parse_sections(&content).is_err());
        assert!(load_migration_file(&path).is_err());
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(create_migration_at(dir.path(), "   ", fixed_now()).is_err());
    }

    #[test]
    fn test_write_config_template() {
        let dir = TempDir::new().unwrap();
        let path = write_config_template(dir.path().join("app"), "app").unwrap();

        let config = DatabaseConfig::from_toml_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.name, "app");
        assert_eq!(config.port, 5432);
    }
}
