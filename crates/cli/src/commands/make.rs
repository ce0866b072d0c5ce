use anyhow::Context;
use std::path::Path;

use matchbox_migrate::create_migration;

use super::database_dir;

/// Scaffold a migration file named after `title`
pub fn run(path: &Path, database: &str, title: &str) -> anyhow::Result<()> {
    let dir = database_dir(path, database);
    let created = create_migration(&dir, title)
        .with_context(|| format!("Failed to create migration '{}'", title))?;

    println!("✅ Created migration: {}", created.display());
    Ok(())
}
