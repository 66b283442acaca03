//! Shared execution types passed from the engine into every handler.
//!
//! Defined here (in the nodes crate) so both the engine and individual
//! handler implementations can import them without a circular dependency.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ExecutionMode
// ---------------------------------------------------------------------------

/// Whether a run performs real side effects or substitutes canned outputs.
///
/// Threaded through the dispatch contract per run, never stored globally,
/// so concurrent simulate/live runs cannot interfere with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Side-effecting handlers return their `simulated*` config values.
    Simulate,
    /// Handlers perform real network/database/AI calls.
    Live,
}

impl ExecutionMode {
    pub fn is_simulation(self) -> bool {
        matches!(self, Self::Simulate)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulate => write!(f, "simulate"),
            Self::Live => write!(f, "live"),
        }
    }
}

// ---------------------------------------------------------------------------
// Server logs
// ---------------------------------------------------------------------------

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

/// One entry of the chronological run log returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
}

/// Append-only log sink shared by the engine and all handlers of one run.
///
/// Entries are timestamped on append and also forwarded to `tracing`, so a
/// run produces both a caller-visible transcript and ordinary process logs.
#[derive(Debug, Clone, Default)]
pub struct RunLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RunLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(LogLevel::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    fn push(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Success => tracing::info!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        };
        // Lock poisoning only happens if a holder panicked; recover the data.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    /// Copy of all entries appended so far, in append order.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Take all entries, leaving the sink empty.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

// ---------------------------------------------------------------------------
// HandlerContext
// ---------------------------------------------------------------------------

/// Per-node context handed to a handler along with its resolved config.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// ID of the node being executed.
    pub node_id: String,
    /// Display name of the node (for log messages).
    pub node_name: String,
    /// Simulate or live.
    pub mode: ExecutionMode,
    /// The user on whose behalf the run executes.
    pub user_id: String,
    /// Shared run log sink.
    pub logger: RunLogger,
}

impl HandlerContext {
    /// Human-readable node identifier used in log messages.
    pub fn identifier(&self) -> String {
        if self.node_name.is_empty() {
            format!("'{}'", self.node_id)
        } else {
            format!("'{}' (ID: {})", self.node_name, self.node_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_appends_in_order() {
        let logger = RunLogger::new();
        logger.info("first");
        logger.error("second");
        logger.success("third");

        let entries = logger.snapshot();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[1].level, LogLevel::Error);
        assert_eq!(entries[2].level, LogLevel::Success);
    }

    #[test]
    fn drain_empties_the_sink() {
        let logger = RunLogger::new();
        logger.info("one");
        assert_eq!(logger.drain().len(), 1);
        assert!(logger.snapshot().is_empty());
    }

    #[test]
    fn log_entry_serializes_with_type_key() {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: "boom".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}
