use anyhow::{bail, Context};
use std::path::Path;

use matchbox_migrate::loader::scaffold::{write_config_template, CONFIG_FILE_NAME};

use super::database_dir;

/// Create `<path>/<database>/` and write a config template into it
pub fn run(path: &Path, database: &str, force: bool) -> anyhow::Result<()> {
    let dir = database_dir(path, database);
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            config_path.display()
        );
    }

    let written = write_config_template(&dir, database)
        .with_context(|| format!("Failed to initialize {}", dir.display()))?;

    println!("✅ Initialized migrations for '{}'", database);
    println!("   Config: {}", written.display());
    println!("   Edit the connection settings, then run `matchbox make --title <name>`");
    Ok(())
}
