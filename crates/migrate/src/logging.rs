//! Logging capability injected into the migrator
//!
//! The engine reports progress through [`MigrationLogger`] instead of writing
//! to stdout. [`TracingLogger`] forwards to `tracing`, [`NoopLogger`] drops
//! everything and is meant for tests.

use std::sync::{Arc, Mutex};

/// Leveled logger used by the ledger and the transition engine
pub trait MigrationLogger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards every message to the `tracing` macros under the `matchbox` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl MigrationLogger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "matchbox", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "matchbox", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "matchbox", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "matchbox", "{}", message);
    }
}

/// Discards all messages
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl MigrationLogger for NoopLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Log level of a captured message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Keeps every message in memory so callers can inspect what was reported
#[derive(Debug, Clone, Default)]
pub struct CapturingLogger {
    records: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl CapturingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured messages, oldest first
    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Captured messages at the given level
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }

    fn push(&self, level: LogLevel, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, message.to_string()));
        }
    }
}

impl MigrationLogger for CapturingLogger {
    fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capturing_logger_filters_by_level() {
        let logger = CapturingLogger::new();
        logger.info("All migrations are up to date");
        logger.warn("two entries carry the pointer");
        logger.info("Applied 2024-01-01T00:00:00.000Z_createUsers");

        assert_eq!(logger.records().len(), 3);
        assert_eq!(
            logger.messages(LogLevel::Info),
            vec![
                "All migrations are up to date".to_string(),
                "Applied 2024-01-01T00:00:00.000Z_createUsers".to_string()
            ]
        );
        assert!(logger.messages(LogLevel::Error).is_empty());
    }

    #[test]
    fn test_noop_logger_accepts_everything() {
        let logger: Arc<dyn MigrationLogger> = Arc::new(NoopLogger);
        logger.debug("ignored");
        logger.error("ignored");
    }
}
