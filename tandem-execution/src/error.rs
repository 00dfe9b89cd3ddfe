//! Error types for supervised execution

use std::path::PathBuf;
use tandem_config::ConfigError;
use tandem_ipc::IpcError;
use thiserror::Error;

/// Misuse of a resource proxy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("The resource identity has already been set")]
    IdentityAlreadySet,

    #[error("The process supervisor has already been set")]
    SupervisorAlreadySet,

    #[error("The proxy is not bound to a process supervisor")]
    NoSupervisor,

    #[error("Expected a {expected} resource, got {actual}")]
    UnexpectedKind { expected: String, actual: String },
}

/// Everything that can go wrong between the host and a worker
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The worker caught an error thrown by the instruction
    #[error("{message}")]
    Remote {
        message: String,
        stack: Option<String>,
    },

    /// The worker died from an uncaught error
    #[error("{message}")]
    FatalWorker { message: String },

    #[error("The idle timeout ({seconds} seconds) has been reached. Either increase the `idle_timeout` option or reduce the time between instructions.")]
    IdleTimeout { seconds: f64 },

    #[error("The worker did not reply within {seconds} seconds. Either increase the `read_timeout` option or make the instruction faster.")]
    ReadTimeout { seconds: f64 },

    #[error("The process has been unexpectedly terminated.")]
    ProcessTerminated,

    #[error("The process exited with code {code:?}.\n\nstdout:\n{stdout}\n\nstderr:\n{stderr}")]
    ProcessFailed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to start {}: {message}", .executable.display())]
    Spawn { executable: PathBuf, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] IpcError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
}

impl SupervisorError {
    /// The worker is gone after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SupervisorError::FatalWorker { .. }
                | SupervisorError::IdleTimeout { .. }
                | SupervisorError::ProcessTerminated
                | SupervisorError::ProcessFailed { .. }
                | SupervisorError::Spawn { .. }
        )
    }

    /// The same supervisor can serve further instructions
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SupervisorError::Remote { .. } | SupervisorError::ReadTimeout { .. }
        )
    }

    /// Stack of the remote error, when the worker sent one
    pub fn remote_stack(&self) -> Option<&str> {
        match self {
            SupervisorError::Remote { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SupervisorError {
    fn from(err: serde_json::Error) -> Self {
        SupervisorError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        let remote = SupervisorError::Remote {
            message: "Object.nope is not a function".into(),
            stack: Some("TypeError: Object.nope is not a function".into()),
        };
        assert!(remote.is_recoverable());
        assert!(!remote.is_fatal());
        assert_eq!(remote.to_string(), "Object.nope is not a function");
        assert!(remote.remote_stack().unwrap().starts_with("TypeError"));

        assert!(SupervisorError::ProcessTerminated.is_fatal());
        assert!(SupervisorError::ReadTimeout { seconds: 0.5 }.is_recoverable());
        assert!(!SupervisorError::Protocol("bad".into()).is_recoverable());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            SupervisorError::ProcessTerminated.to_string(),
            "The process has been unexpectedly terminated."
        );
        assert!(SupervisorError::IdleTimeout { seconds: 0.5 }
            .to_string()
            .starts_with("The idle timeout (0.5 seconds) has been reached."));
        assert_eq!(
            SupervisorError::from(ProxyError::IdentityAlreadySet).to_string(),
            "Proxy error: The resource identity has already been set"
        );
    }
}
