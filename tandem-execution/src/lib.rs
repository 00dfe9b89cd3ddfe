//! Host side of Tandem
//!
//! An [`EntryPoint`] spawns a `tandem-worker` process running a JavaScript
//! delegate script, and hands out [`ResourceProxy`] values through which
//! worker objects are called, read and written as if they were local.
//! Worker failures surface as [`SupervisorError`] variants.

pub mod delegate;
pub mod entry_point;
pub mod error;
pub mod process;
pub mod proxy;
pub mod serializer;
pub mod supervisor;
pub mod value;

pub use delegate::{BasicProcessDelegate, FsProcessDelegate, ProcessDelegate};
pub use entry_point::{EntryPoint, EntryPointBuilder};
pub use error::{ProxyError, SupervisorError};
pub use process::{classify_failure, ProcessHealth};
pub use proxy::{
    BasicResource, CommunicatesWithSupervisor, IdentifiesResource, Proxy, ResourceProxy,
    StatsResource, TypedResource, BASIC_RESOURCE,
};
pub use supervisor::ProcessSupervisor;
pub use value::{JsFunction, Parameter, Value};
