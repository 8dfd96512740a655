//! Logging capability injected into the feed.
//!
//! The feed never picks a process-wide logger on its own. Callers hand it an
//! [`EventLogger`]; [`TracingLogger`] forwards to `tracing`, the others are
//! for tests and quiet deployments.

use std::sync::Arc;

use parking_lot::Mutex;

/// Severity of a captured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug detail.
    Debug,
    /// Informational.
    Info,
    /// Something unexpected but tolerated.
    Warn,
    /// A record or enrichment was lost.
    Error,
}

/// Trait for log backends.
pub trait EventLogger: Send + Sync {
    /// Log a debug message.
    fn debug(&self, message: &str);

    /// Log an informational message.
    fn info(&self, message: &str);

    /// Log a warning.
    fn warn(&self, message: &str);

    /// Log an error.
    fn error(&self, message: &str);
}

/// Shared logger handle.
pub type SharedLogger = Arc<dyn EventLogger>;

/// Logger that forwards to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "opwatch", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "opwatch", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "opwatch", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "opwatch", "{message}");
    }
}

/// No-op logger that discards all messages.
#[derive(Debug, Clone, Default)]
pub struct NullLogger;

impl EventLogger for NullLogger {
    fn debug(&self, _message: &str) {}

    fn info(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}

/// In-memory logger for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl MemoryLogger {
    /// Create a new memory logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured lines.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Get captured messages of one level.
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Clear all lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Check if nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    fn push(&self, level: LogLevel, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

impl EventLogger for MemoryLogger {
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

/// Wraps a logger and silences it unless debug mode is on.
pub struct DebugGate {
    inner: SharedLogger,
    enabled: bool,
}

impl DebugGate {
    /// Gate `inner` behind `enabled`.
    pub fn new(inner: SharedLogger, enabled: bool) -> Self {
        Self { inner, enabled }
    }

    /// Whether messages pass through.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl EventLogger for DebugGate {
    fn debug(&self, message: &str) {
        if self.enabled {
            self.inner.debug(message);
        }
    }

    fn info(&self, message: &str) {
        if self.enabled {
            self.inner.info(message);
        }
    }

    fn warn(&self, message: &str) {
        if self.enabled {
            self.inner.warn(message);
        }
    }

    fn error(&self, message: &str) {
        if self.enabled {
            self.inner.error(message);
        }
    }
}
