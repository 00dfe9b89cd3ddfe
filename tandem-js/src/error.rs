//! Worker error types

use std::path::PathBuf;
use tandem_ipc::{ErrorEnvelope, IpcError, IDLE_TIMEOUT_MESSAGE};
use thiserror::Error;

/// Errors that stop the worker.
///
/// Errors raised by instructions that asked for `catch_errors` never get
/// here: they are answered with an error envelope instead.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// An instruction failed and nobody caught it
    #[error("{}", .0.message)]
    Uncaught(ErrorEnvelope),

    #[error("{}", IDLE_TIMEOUT_MESSAGE)]
    IdleTimeout,

    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Invalid worker options: {0}")]
    Config(String),

    #[error("Failed to load delegate {}: {message}", .path.display())]
    DelegateLoad { path: PathBuf, message: String },

    #[error("The response or error handler has already been used for this instruction")]
    HandlerAlreadyUsed,

    #[error("JavaScript engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    /// The envelope written to stderr before the worker exits
    pub fn to_envelope(&self) -> ErrorEnvelope {
        match self {
            WorkerError::Uncaught(envelope) => envelope.clone(),
            WorkerError::IdleTimeout => ErrorEnvelope::idle_timeout(),
            other => ErrorEnvelope::new(other.to_string(), None),
        }
    }
}

impl From<boa_engine::JsError> for WorkerError {
    fn from(err: boa_engine::JsError) -> Self {
        WorkerError::Engine(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncaught_keeps_remote_stack() {
        let envelope = ErrorEnvelope::new("boom", Some("Error: boom\n    at x".to_string()));
        let error = WorkerError::Uncaught(envelope.clone());

        assert_eq!(error.to_string(), "boom");
        assert_eq!(error.to_envelope(), envelope);
    }

    #[test]
    fn test_idle_timeout_envelope() {
        assert!(WorkerError::IdleTimeout.to_envelope().is_idle_timeout());
        assert_eq!(WorkerError::IdleTimeout.to_string(), IDLE_TIMEOUT_MESSAGE);
    }

    #[test]
    fn test_other_errors_have_no_stack() {
        let envelope = WorkerError::Config("bad".to_string()).to_envelope();
        assert_eq!(envelope.message, "Invalid worker options: bad");
        assert!(envelope.stack.is_none());
    }
}
