//! Log levels and events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Log level enumeration
///
/// Severity levels from most verbose (Trace) to least verbose (Error).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Detailed tracing information for debugging
    Trace,
    /// Debug information useful during development
    Debug,
    /// Informational messages about normal operation
    Info,
    /// Warning messages about potential issues
    Warn,
    /// Error messages about failures
    Error,
}

impl LogLevel {
    /// Convert log level to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Map a worker console method (`log`, `warn`, ...) to a level
    pub fn from_console_method(method: &str) -> Self {
        match method {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Check if this level should be logged given a minimum level
    pub fn should_log(&self, min_level: LogLevel) -> bool {
        self >= &min_level
    }
}

impl FromStr for LogLevel {
    type Err = LogLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(LogLevelParseError(s.to_string())),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when parsing log level from string
#[derive(Debug, thiserror::Error)]
#[error("Invalid log level: '{0}'")]
pub struct LogLevelParseError(String);

/// Structured log event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Log level/severity
    pub level: LogLevel,
    /// Primary log message
    pub message: String,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Source component that generated the log
    pub source: Option<String>,
    /// Structured context data
    pub context: JsonValue,
}

impl LogEvent {
    /// Create a new log event with minimal information
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            source: None,
            context: JsonValue::Null,
        }
    }

    /// Set the source component
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a single key-value pair to the context
    pub fn with_field(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        if self.context.is_null() {
            self.context = JsonValue::Object(serde_json::Map::new());
        }

        if let JsonValue::Object(ref mut map) = self.context {
            map.insert(key.to_string(), value.into());
        }

        self
    }

    /// Read back a context field
    pub fn field(&self, key: &str) -> Option<&JsonValue> {
        self.context.get(key)
    }
}
