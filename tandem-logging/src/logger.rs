//! The logger interface called by the supervisor

use crate::event::{LogEvent, LogLevel};

/// Structured logger trait
///
/// Implementations route events wherever they like. The supervisor only ever
/// calls [`StructuredLogger::log`] through the convenience methods.
pub trait StructuredLogger: Send + Sync {
    /// Log a structured event
    fn log(&self, event: LogEvent);

    /// Log with level and message (convenience method)
    fn log_simple(&self, level: LogLevel, message: String) {
        self.log(LogEvent::new(level, message));
    }

    /// Debug level logging
    fn debug(&self, message: String) {
        self.log_simple(LogLevel::Debug, message);
    }

    /// Info level logging
    fn info(&self, message: String) {
        self.log_simple(LogLevel::Info, message);
    }

    /// Warn level logging
    fn warn(&self, message: String) {
        self.log_simple(LogLevel::Warn, message);
    }

    /// Error level logging
    fn error(&self, message: String) {
        self.log_simple(LogLevel::Error, message);
    }
}

/// Forwards events to the `tracing` subscriber of the process
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    source: Option<String>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix forwarded messages with a component name
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }
}

impl StructuredLogger for TracingLogger {
    fn log(&self, event: LogEvent) {
        let source = event
            .source
            .as_deref()
            .or(self.source.as_deref())
            .unwrap_or("tandem");

        match event.level {
            LogLevel::Trace => tracing::trace!(source, "{}", event.message),
            LogLevel::Debug => tracing::debug!(source, "{}", event.message),
            LogLevel::Info => tracing::info!(source, "{}", event.message),
            LogLevel::Warn => tracing::warn!(source, "{}", event.message),
            LogLevel::Error => tracing::error!(source, "{}", event.message),
        }
    }
}
