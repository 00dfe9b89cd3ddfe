//! JavaScript worker engine for Tandem
//!
//! The worker embeds a Boa context, loads a connection delegate script and
//! serves instructions over the framed socket transport of `tandem-ipc`.
//! Objects that cannot cross the process boundary by value are kept in a
//! [`ResourceRepository`] and referenced by identity.

pub mod delegate;
pub mod engine;
pub mod error;
pub mod function;
pub mod handlers;
pub mod instruction;
mod natives;
pub mod options;
pub mod repository;
pub mod serializer;
pub mod server;

pub use delegate::{ConnectionDelegate, ScriptDelegate};
pub use engine::Engine;
pub use error::WorkerError;
pub use function::FunctionEnvelope;
pub use handlers::InstructionHandlers;
pub use instruction::PreparedInstruction;
pub use options::WorkerOptions;
pub use repository::ResourceRepository;
pub use serializer::{Serializer, Unserializer};
pub use server::{handle_payload, serve, Server};
