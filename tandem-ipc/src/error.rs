//! Transport errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(String),

    /// The peer closed the connection in the middle of a message
    #[error("Connection closed")]
    ConnectionClosed,

    /// No inbound activity within the allowed window
    #[error("Timeout waiting for inbound data")]
    Timeout,

    /// A packet header or body could not be parsed
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// The packets parsed but the payload they carry did not decode
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The payload does not fit in the packet counter
    #[error("Payload too large: {packets} packets needed, at most {max} allowed")]
    PayloadTooLarge { packets: usize, max: usize },
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => IpcError::ConnectionClosed,
            _ => IpcError::Io(err.to_string()),
        }
    }
}
