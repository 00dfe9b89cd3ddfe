//! Records exchanged between the host and the worker
//!
//! Instructions travel host → worker, replies travel worker → host. Values
//! inside both are plain JSON, except for three tagged envelopes recognised by
//! a marker key set to `true`: errors, resources and functions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// Marker key of an error envelope
pub const ERROR_MARKER: &str = "__error__";

/// Marker key of a resource envelope
pub const RESOURCE_MARKER: &str = "__resource__";

/// Marker key of a function envelope
pub const FUNCTION_MARKER: &str = "__function__";

/// Message the worker reports on stderr before exiting from inactivity
pub const IDLE_TIMEOUT_MESSAGE: &str = "The idle timeout has been reached.";

/// Whether `value` is an object carrying `marker: true`
pub fn has_marker(value: &JsonValue, marker: &str) -> bool {
    value
        .as_object()
        .and_then(|object| object.get(marker))
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

/// What an instruction does with its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    Call,
    Get,
    Set,
}

impl fmt::Display for InstructionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstructionType::Call => "call",
            InstructionType::Get => "get",
            InstructionType::Set => "set",
        };
        f.write_str(name)
    }
}

/// Whether the worker settles promises before replying
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Eager,
    Lazy,
}

/// Error when parsing an execution mode from string
#[derive(Debug, thiserror::Error)]
#[error("Unknown execution mode: '{0}'")]
pub struct UnknownExecutionMode(pub String);

impl FromStr for ExecutionMode {
    type Err = UnknownExecutionMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" => Ok(ExecutionMode::Eager),
            "lazy" => Ok(ExecutionMode::Lazy),
            other => Err(UnknownExecutionMode(other.to_string())),
        }
    }
}

/// Identifies a worker-side object without transferring it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub class_name: String,
    #[serde(rename = "id")]
    pub unique_identifier: String,
}

impl ResourceIdentity {
    pub fn new(class_name: impl Into<String>, unique_identifier: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            unique_identifier: unique_identifier.into(),
        }
    }

    /// Wire form: `{"__resource__": true, "class_name": .., "id": ..}`
    pub fn to_envelope(&self) -> JsonValue {
        json!({
            RESOURCE_MARKER: true,
            "class_name": self.class_name,
            "id": self.unique_identifier,
        })
    }

    /// Parse a resource envelope, `None` for any other value
    pub fn from_envelope(value: &JsonValue) -> Option<Self> {
        if !has_marker(value, RESOURCE_MARKER) {
            return None;
        }

        let class_name = value.get("class_name")?.as_str()?;
        let id = value.get("id")?.as_str()?;
        Some(Self::new(class_name, id))
    }
}

/// Error reported by the worker, either in a reply or on stderr
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            message: message.into(),
            stack,
        }
    }

    /// The envelope the worker emits when it stops from inactivity
    pub fn idle_timeout() -> Self {
        Self::new(IDLE_TIMEOUT_MESSAGE, None)
    }

    pub fn is_idle_timeout(&self) -> bool {
        self.message == IDLE_TIMEOUT_MESSAGE
    }

    /// The message, followed by the stack trace in debug mode
    pub fn describe(&self, debug: bool) -> String {
        match (debug, &self.stack) {
            (true, Some(stack)) => format!("{}\n\n{}", self.message, stack),
            _ => self.message.clone(),
        }
    }

    pub fn to_envelope(&self) -> JsonValue {
        json!({
            ERROR_MARKER: true,
            "message": self.message,
            "stack": self.stack,
        })
    }

    pub fn from_envelope(value: &JsonValue) -> Option<Self> {
        if !has_marker(value, ERROR_MARKER) {
            return None;
        }

        let message = value
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let stack = value
            .get("stack")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        Some(Self { message, stack })
    }

    /// Find the last line of `output` holding an error envelope
    pub fn find_in_output(output: &str) -> Option<Self> {
        output
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str::<JsonValue>(line.trim()).ok())
            .find_map(|value| Self::from_envelope(&value))
    }
}

/// A single unit of work sent to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: InstructionType,
    pub name: String,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default)]
    pub resource: Option<ResourceIdentity>,
    #[serde(default)]
    pub catch_errors: bool,
    #[serde(default)]
    pub execution_mode: Option<ExecutionMode>,
}

impl Instruction {
    fn new(kind: InstructionType, name: impl Into<String>, value: JsonValue) -> Self {
        Self {
            kind,
            name: name.into(),
            value,
            resource: None,
            catch_errors: false,
            execution_mode: None,
        }
    }

    pub fn call(name: impl Into<String>, arguments: Vec<JsonValue>) -> Self {
        Self::new(InstructionType::Call, name, JsonValue::Array(arguments))
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(InstructionType::Get, name, JsonValue::Null)
    }

    pub fn set(name: impl Into<String>, value: JsonValue) -> Self {
        Self::new(InstructionType::Set, name, value)
    }

    pub fn with_resource(mut self, resource: Option<ResourceIdentity>) -> Self {
        self.resource = resource;
        self
    }

    pub fn catching_errors(mut self, catch_errors: bool) -> Self {
        self.catch_errors = catch_errors;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }
}

/// One line of worker console output shipped with a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub message: String,
}

/// What the worker sends back for one instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub logs: Vec<ConsoleEntry>,
    #[serde(default)]
    pub value: JsonValue,
}

impl Reply {
    pub fn new(value: JsonValue) -> Self {
        Self {
            logs: Vec::new(),
            value,
        }
    }

    pub fn with_logs(mut self, logs: Vec<ConsoleEntry>) -> Self {
        self.logs = logs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_wire_format() {
        let instruction = Instruction::call("statSync", vec![json!("/tmp")])
            .with_resource(Some(ResourceIdentity::new("Stats", "1.a")))
            .catching_errors(true)
            .with_execution_mode(ExecutionMode::Lazy);

        let wire = serde_json::to_value(&instruction).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "call",
                "name": "statSync",
                "value": ["/tmp"],
                "resource": {"class_name": "Stats", "id": "1.a"},
                "catch_errors": true,
                "execution_mode": "lazy",
            })
        );
    }

    #[test]
    fn test_instruction_defaults_when_fields_missing() {
        let instruction: Instruction =
            serde_json::from_value(json!({"type": "get", "name": "constants"})).unwrap();

        assert_eq!(instruction.kind, InstructionType::Get);
        assert!(instruction.resource.is_none());
        assert!(!instruction.catch_errors);
        assert!(instruction.execution_mode.is_none());
        assert!(instruction.value.is_null());
    }

    #[test]
    fn test_unknown_execution_mode_is_rejected() {
        let result = serde_json::from_value::<Instruction>(
            json!({"type": "get", "name": "x", "execution_mode": "eventually"}),
        );
        assert!(result.is_err());
        assert!("eventually".parse::<ExecutionMode>().is_err());
        assert_eq!("lazy".parse::<ExecutionMode>().unwrap(), ExecutionMode::Lazy);
    }

    #[test]
    fn test_resource_envelope() {
        let identity = ResourceIdentity::new("Stats", "abc");
        let envelope = identity.to_envelope();

        assert!(has_marker(&envelope, RESOURCE_MARKER));
        assert!(!has_marker(&envelope, ERROR_MARKER));
        assert_eq!(ResourceIdentity::from_envelope(&envelope), Some(identity));
        assert_eq!(ResourceIdentity::from_envelope(&json!({"class_name": "x"})), None);
    }

    #[test]
    fn test_marker_must_be_true() {
        assert!(!has_marker(&json!({"__error__": "yes"}), ERROR_MARKER));
        assert!(!has_marker(&json!({"__error__": false}), ERROR_MARKER));
        assert!(!has_marker(&json!([1, 2]), ERROR_MARKER));
    }

    #[test]
    fn test_error_envelope_found_in_noisy_output() {
        let stderr = format!(
            "warning: something\n{}\nunrelated trailer\n",
            ErrorEnvelope::new("boom", Some("Error: boom".into())).to_envelope()
        );

        let envelope = ErrorEnvelope::find_in_output(&stderr).unwrap();
        assert_eq!(envelope.message, "boom");
        assert_eq!(envelope.stack.as_deref(), Some("Error: boom"));
        assert!(ErrorEnvelope::find_in_output("plain text\n{\"a\":1}").is_none());
    }

    #[test]
    fn test_stack_is_appended_in_debug_mode() {
        let envelope = ErrorEnvelope::new("boom", Some("Error: boom\n    at run".to_string()));
        assert_eq!(envelope.describe(false), "boom");
        assert_eq!(envelope.describe(true), "boom\n\nError: boom\n    at run");
        assert_eq!(ErrorEnvelope::new("boom", None).describe(true), "boom");
    }

    #[test]
    fn test_idle_timeout_envelope() {
        let line = ErrorEnvelope::idle_timeout().to_envelope().to_string();
        let envelope = ErrorEnvelope::find_in_output(&line).unwrap();
        assert!(envelope.is_idle_timeout());
    }

    #[test]
    fn test_reply_without_logs() {
        let reply: Reply = serde_json::from_str(r#"{"value": 42}"#).unwrap();
        assert!(reply.logs.is_empty());
        assert_eq!(reply.value, json!(42));
    }
}
