use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use matchbox_migrate::{load_registry, DatabaseConfig, MigrationStatus, Migrator, PgDatabase};

use super::database_dir;

/// What `matchbox migrate` does after initializing the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Apply the next migration
    Up,
    /// Revert the current migration
    Down,
    /// Apply every remaining migration in one transaction
    #[value(alias = "syncAll")]
    SyncAll,
    /// Show the ledger without changing it
    Status,
}

#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub mode: Mode,
    pub path: PathBuf,
    pub database: String,
    pub config: String,
    pub json: bool,
}

/// `<path>/<database>/<config>.toml`
pub fn config_path(path: &Path, database: &str, config: &str) -> PathBuf {
    let file_name = if config.ends_with(".toml") {
        config.to_string()
    } else {
        format!("{}.toml", config)
    };
    database_dir(path, database).join(file_name)
}

pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let dir = database_dir(&args.path, &args.database);
    let config_file = config_path(&args.path, &args.database, &args.config);

    let config = DatabaseConfig::load(&config_file)
        .with_context(|| format!("Failed to load {}", config_file.display()))?;
    let registry = load_registry(&dir)
        .with_context(|| format!("Failed to load migrations from {}", dir.display()))?;
    tracing::info!(
        "Loaded {} migration(s), connecting to {}",
        registry.len(),
        config.masked_url()
    );

    let database = PgDatabase::connect(&config)
        .await
        .context("Failed to connect to the database")?;
    let migrator = Migrator::new(registry, Arc::new(database));

    let outcome = execute(&migrator, args.mode, args.json).await;
    let closed = migrator.finish().await;

    outcome?;
    closed.context("Failed to close the connection pool")?;
    Ok(())
}

async fn execute(migrator: &Migrator, mode: Mode, json: bool) -> anyhow::Result<()> {
    migrator.init().await.context("Failed to initialize the migration ledger")?;

    match mode {
        Mode::Up => {
            let transition = migrator.up().await.context("Migration up failed")?;
            print_output(&transition, &transition.to_string(), json)
        }
        Mode::Down => {
            let transition = migrator.down().await.context("Migration down failed")?;
            print_output(&transition, &transition.to_string(), json)
        }
        Mode::SyncAll => {
            let report = migrator.sync_all().await.context("Migration sync failed")?;
            let text = if report.applied.is_empty() {
                "All migrations are up to date".to_string()
            } else {
                format!(
                    "Applied {} migration(s):\n{}",
                    report.applied.len(),
                    report
                        .applied
                        .iter()
                        .map(|title| format!("  {}", title))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            };
            print_output(&report, &text, json)
        }
        Mode::Status => {
            let statuses = migrator.status().await.context("Failed to read the ledger")?;
            print_output(&statuses, &render_status(&statuses), json)
        }
    }
}

fn print_output<T: Serialize>(value: &T, text: &str, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

/// Plain-text ledger listing, one migration per line
pub fn render_status(statuses: &[MigrationStatus]) -> String {
    if statuses.is_empty() {
        return "No migrations found".to_string();
    }

    let mut lines = vec!["Migration Status:".to_string(), "================".to_string()];
    for status in statuses {
        let marker = if status.current {
            "▶"
        } else if status.applied {
            "✓"
        } else {
            "·"
        };

        let mut line = format!("  {} {}", marker, status.title);
        if let Some(description) = &status.description {
            line.push_str(&format!("  ({})", description));
        }
        if !status.declared {
            line.push_str("  [missing file]");
        } else if !status.registered {
            line.push_str("  [new]");
        }
        lines.push(line);
    }

    let applied = statuses.iter().filter(|status| status.applied).count();
    lines.push(String::new());
    lines.push(format!("{} of {} applied", applied, statuses.len()));
    lines.join("\n")
}
