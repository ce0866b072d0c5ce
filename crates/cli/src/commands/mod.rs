pub mod init;
pub mod make;
pub mod migrate;

use std::path::{Path, PathBuf};

/// Folder holding the scripts and config of one database: `<path>/<database>`
pub fn database_dir(path: &Path, database: &str) -> PathBuf {
    path.join(database)
}
