//! Logging for Tandem
//!
//! The supervisor reports what it does to an injected [`StructuredLogger`].
//! [`TracingLogger`] forwards those events to `tracing`; the `init_*`
//! functions install a `tracing` subscriber for binaries.

pub mod event;
pub mod init;
pub mod logger;

pub use event::{LogEvent, LogLevel, LogLevelParseError};
pub use init::{init_simple_tracing, init_worker_tracing};
pub use logger::{StructuredLogger, TracingLogger};
