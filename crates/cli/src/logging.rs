//! Logging setup for the `matchbox` binary

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "matchbox=info,matchbox_migrate=info,sqlx=warn";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Emit one JSON object per event instead of plain text
    pub json_format: bool,
    /// Directive string used when `RUST_LOG` is not set
    pub env_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            env_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn json(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }

    /// Raise the default filter to debug
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.env_filter = "matchbox=debug,matchbox_migrate=debug,sqlx=info".to_string();
        }
        self
    }
}

/// Install the global subscriber. Logs go to stderr so command output stays clean.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.env_filter))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init()?;
    }

    tracing::debug!(
        "Logging initialized (format: {})",
        if config.json_format { "JSON" } else { "text" }
    );
    Ok(())
}
