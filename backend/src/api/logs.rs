//! Run progress streaming via Server-Sent Events (SSE).
//!
//! Progress messages go two ways: to `tracing` (so they land wherever the
//! subscriber writes) and to a broadcast channel that `GET /api/logs` clients
//! subscribe to. Sending never blocks and never fails when nobody listens.
//!
//! Entries emitted during a run carry its `runId`, so a client watching the
//! shared stream can follow one run among several concurrent ones.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered entries per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// Log level for SSE clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single progress entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Run the entry belongs to; absent for server-level messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl LogEntry {
    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            run_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Process-wide broadcaster used by the pipeline and the SSE endpoint
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Fans log entries out to every connected SSE client
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Emit a tracing event and publish the entry to subscribers
    pub fn log(&self, entry: LogEntry) {
        let run_id = entry.run_id.as_deref().unwrap_or("-");
        match entry.level {
            LogLevel::Info => tracing::info!(target: "reshape::progress", run_id, "{}", entry.message),
            LogLevel::Success => {
                tracing::info!(target: "reshape::progress", run_id, outcome = "success", "{}", entry.message)
            }
            LogLevel::Warning => tracing::warn!(target: "reshape::progress", run_id, "{}", entry.message),
            LogLevel::Error => tracing::error!(target: "reshape::progress", run_id, "{}", entry.message),
        }

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes entries tagged with one run's id.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
}

impl RunLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.emit(LogEntry::info(msg));
    }

    pub fn success(&self, msg: impl Into<String>) {
        self.emit(LogEntry::success(msg));
    }

    pub fn warning(&self, msg: impl Into<String>) {
        self.emit(LogEntry::warning(msg));
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.emit(LogEntry::error(msg));
    }

    fn emit(&self, entry: LogEntry) {
        LOG_BROADCASTER.log(entry.with_run_id(self.run_id.clone()));
    }
}

/// Server-level error not tied to a run
pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}
