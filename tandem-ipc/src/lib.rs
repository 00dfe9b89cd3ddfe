//! Inter-process communication for Tandem
//!
//! This crate holds the records exchanged between the host and the worker
//! (instructions, replies and the tagged value envelopes) together with the
//! framed socket transport that carries them.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use codec::{BODY_SIZE, HEADER_SIZE, PACKET_SIZE};
pub use error::IpcError;
pub use protocol::{
    ConsoleEntry, ErrorEnvelope, ExecutionMode, Instruction, InstructionType, Reply,
    ResourceIdentity, ERROR_MARKER, FUNCTION_MARKER, IDLE_TIMEOUT_MESSAGE, RESOURCE_MARKER,
};
pub use transport::{IpcTransport, SocketTransport};
