//! Database configuration
//!
//! Connection settings live in a TOML file next to the migration scripts
//! (`<path>/<database>/config.toml`). `DATABASE_URL`, when set, overrides the
//! connection parameters read from the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{MigrateError, MigrateResult};

/// Environment variable that overrides the file's connection parameters
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Connection settings for the migrated database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name
    pub name: String,
    pub username: String,
    pub password: String,
    /// Give up acquiring a connection after this many milliseconds
    #[serde(default)]
    pub connection_timeout_millis: Option<u64>,
    /// Close idle connections after this many milliseconds
    #[serde(default)]
    pub idle_timeout_millis: Option<u64>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseConfig {
    /// Minimal configuration for a local database
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_port(),
            name: name.into(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            connection_timeout_millis: None,
            idle_timeout_millis: None,
            max_connections: default_max_connections(),
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> MigrateResult<Self> {
        let config: DatabaseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, then apply the `DATABASE_URL` override
    pub fn load(path: &Path) -> MigrateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;

        match std::env::var(DATABASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => config.with_url_override(&url),
            _ => Ok(config),
        }
    }

    /// Replace connection parameters with the ones found in `url`
    pub fn with_url_override(mut self, url: &str) -> MigrateResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| MigrateError::Configuration(format!("Invalid database URL: {}", e)))?;

        if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
            return Err(MigrateError::Configuration(
                "Invalid PostgreSQL URL scheme".to_string(),
            ));
        }

        if let Some(host) = parsed.host_str() {
            self.host = host.to_string();
        }
        if let Some(port) = parsed.port() {
            self.port = port;
        }
        let database = parsed.path().trim_start_matches('/');
        if !database.is_empty() {
            self.name = database.to_string();
        }
        if !parsed.username().is_empty() {
            self.username = decode_credential(parsed.username())?;
        }
        if let Some(password) = parsed.password() {
            self.password = decode_credential(password)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check required fields
    pub fn validate(&self) -> MigrateResult<()> {
        if self.host.trim().is_empty() {
            return Err(MigrateError::Configuration("host must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(MigrateError::Configuration("name must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(MigrateError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the configuration as a connection URL, for display only.
    ///
    /// Connections are opened from the individual fields. Credentials are
    /// percent-encoded here so they round-trip through [`with_url_override`](Self::with_url_override).
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.name
        )
    }

    /// Same as [`connection_url`](Self::connection_url) with the password hidden
    pub fn masked_url(&self) -> String {
        mask_database_url(&self.connection_url())
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.connection_timeout_millis.map(Duration::from_millis)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_millis.map(Duration::from_millis)
    }

    /// Template written by `matchbox init`
    pub fn template(database: &str) -> String {
        format!(
            "# Connection settings for {database}. DATABASE_URL overrides these when set.\n\
             host = \"localhost\"\n\
             port = 5432\n\
             name = \"{database}\"\n\
             username = \"username\"\n\
             password = \"password\"\n\
             max_connections = 10\n"
        )
    }
}

/// Replace the password of a database URL with `****`
pub fn mask_database_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_ok() {
                url.to_string()
            } else {
                url_str.to_string()
            }
        }
        _ => url_str.to_string(),
    }
}

/// URL userinfo is percent-encoded
fn decode_credential(raw: &str) -> MigrateResult<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| MigrateError::Configuration(format!("Invalid credentials in database URL: {}", e)))
}
