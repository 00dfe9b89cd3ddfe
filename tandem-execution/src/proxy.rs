//! Host-side handles on worker objects

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tandem_ipc::{ExecutionMode, Instruction, ResourceIdentity};

use crate::error::{ProxyError, SupervisorError};
use crate::serializer::serialize;
use crate::supervisor::ProcessSupervisor;
use crate::value::Value;

/// Resource kind given to worker classes without a dedicated host type
pub const BASIC_RESOURCE: &str = "BasicResource";

/// Carries the identity of a worker object
pub trait IdentifiesResource {
    fn resource_identity(&self) -> Option<&ResourceIdentity>;

    /// Set the identity. It can be set once.
    fn set_resource_identity(&self, identity: ResourceIdentity) -> Result<(), ProxyError>;
}

/// Carries the supervisor instructions are sent through
pub trait CommunicatesWithSupervisor {
    fn supervisor(&self) -> Result<&Arc<ProcessSupervisor>, ProxyError>;

    /// Set the supervisor. It can be set once.
    fn set_supervisor(&self, supervisor: Arc<ProcessSupervisor>) -> Result<(), ProxyError>;
}

/// Dynamic access to a worker object
#[async_trait]
pub trait Proxy: IdentifiesResource + CommunicatesWithSupervisor + Sync {
    /// Failures come back as [`SupervisorError::Remote`] instead of killing
    /// the worker
    fn catches_errors(&self) -> bool {
        false
    }

    /// Mode sent with instructions, `None` for the worker default
    fn execution_mode(&self) -> Option<ExecutionMode> {
        None
    }

    fn instruction(&self, instruction: Instruction) -> Instruction {
        let instruction = instruction
            .with_resource(self.resource_identity().cloned())
            .catching_errors(self.catches_errors());
        match self.execution_mode() {
            Some(mode) => instruction.with_execution_mode(mode),
            None => instruction,
        }
    }

    /// Call the method `name` with `arguments`
    async fn call(&self, name: &str, arguments: Vec<Value>) -> Result<Value, SupervisorError> {
        let arguments = arguments
            .iter()
            .map(serialize)
            .collect::<Result<Vec<JsonValue>, _>>()?;
        let instruction = self.instruction(Instruction::call(name, arguments));

        self.supervisor()?.execute_instruction(instruction).await
    }

    /// Read the property `name`
    async fn get(&self, name: &str) -> Result<Value, SupervisorError> {
        let instruction = self.instruction(Instruction::get(name));
        self.supervisor()?.execute_instruction(instruction).await
    }

    /// Write the property `name`, returning the value the worker stored
    async fn set(&self, name: &str, value: Value) -> Result<Value, SupervisorError> {
        let instruction = self.instruction(Instruction::set(name, serialize(&value)?));
        self.supervisor()?.execute_instruction(instruction).await
    }
}

/// Proxy for one worker object, or for the delegate's default target when it
/// has no identity
#[derive(Clone, Default)]
pub struct ResourceProxy {
    identity: OnceCell<ResourceIdentity>,
    supervisor: OnceCell<Arc<ProcessSupervisor>>,
    kind: Option<String>,
    catch_errors: bool,
    execution_mode: Option<ExecutionMode>,
}

impl ResourceProxy {
    /// An unbound proxy
    pub fn new() -> Self {
        Self::default()
    }

    /// A proxy of `kind` for the worker object `identity`
    pub fn bound(
        identity: ResourceIdentity,
        kind: impl Into<String>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Self {
        Self {
            identity: OnceCell::with_value(identity),
            supervisor: OnceCell::with_value(supervisor),
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// The host resource kind picked by the process delegate
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(BASIC_RESOURCE)
    }

    /// Class name of the worker object
    pub fn class_name(&self) -> Option<&str> {
        self.identity.get().map(|identity| identity.class_name.as_str())
    }

    /// A clone whose instructions catch worker errors
    pub fn try_catch(&self) -> Self {
        Self {
            catch_errors: true,
            ..self.clone()
        }
    }

    /// A clone whose instructions run in `mode`
    pub fn with_execution_mode(&self, mode: ExecutionMode) -> Self {
        Self {
            execution_mode: Some(mode),
            ..self.clone()
        }
    }

    /// Wrap in the typed resource `T`, checking the kind
    pub fn downcast<T: TypedResource>(self) -> Result<T, ProxyError> {
        if self.kind() != T::KIND {
            return Err(ProxyError::UnexpectedKind {
                expected: T::KIND.to_string(),
                actual: self.kind().to_string(),
            });
        }
        Ok(T::from_proxy(self))
    }
}

impl IdentifiesResource for ResourceProxy {
    fn resource_identity(&self) -> Option<&ResourceIdentity> {
        self.identity.get()
    }

    fn set_resource_identity(&self, identity: ResourceIdentity) -> Result<(), ProxyError> {
        self.identity
            .set(identity)
            .map_err(|_| ProxyError::IdentityAlreadySet)
    }
}

impl CommunicatesWithSupervisor for ResourceProxy {
    fn supervisor(&self) -> Result<&Arc<ProcessSupervisor>, ProxyError> {
        self.supervisor.get().ok_or(ProxyError::NoSupervisor)
    }

    fn set_supervisor(&self, supervisor: Arc<ProcessSupervisor>) -> Result<(), ProxyError> {
        self.supervisor
            .set(supervisor)
            .map_err(|_| ProxyError::SupervisorAlreadySet)
    }
}

impl Proxy for ResourceProxy {
    fn catches_errors(&self) -> bool {
        self.catch_errors
    }

    fn execution_mode(&self) -> Option<ExecutionMode> {
        self.execution_mode
    }
}

impl PartialEq for ResourceProxy {
    fn eq(&self, other: &Self) -> bool {
        self.identity.get() == other.identity.get() && self.kind() == other.kind()
    }
}

impl fmt::Debug for ResourceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceProxy")
            .field("identity", &self.identity.get())
            .field("kind", &self.kind())
            .field("bound", &self.supervisor.get().is_some())
            .field("catch_errors", &self.catch_errors)
            .finish()
    }
}

/// A host type standing for a kind of worker object
pub trait TypedResource: Sized {
    /// Kind name returned by the process delegate for this type
    const KIND: &'static str;

    fn from_proxy(proxy: ResourceProxy) -> Self;

    fn proxy(&self) -> &ResourceProxy;
}

/// Worker object without a dedicated host type
#[derive(Debug, Clone, PartialEq)]
pub struct BasicResource(ResourceProxy);

impl TypedResource for BasicResource {
    const KIND: &'static str = BASIC_RESOURCE;

    fn from_proxy(proxy: ResourceProxy) -> Self {
        Self(proxy)
    }

    fn proxy(&self) -> &ResourceProxy {
        &self.0
    }
}

/// `fs.Stats` returned by the worker's `fs` module
#[derive(Debug, Clone, PartialEq)]
pub struct StatsResource(ResourceProxy);

impl StatsResource {
    pub async fn is_file(&self) -> Result<bool, SupervisorError> {
        Ok(self.0.call("isFile", vec![]).await?.as_bool().unwrap_or(false))
    }

    pub async fn is_directory(&self) -> Result<bool, SupervisorError> {
        Ok(self
            .0
            .call("isDirectory", vec![])
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    pub async fn size(&self) -> Result<u64, SupervisorError> {
        let size = self.0.get("size").await?;
        Ok(size.as_f64().map_or(0, |size| size as u64))
    }
}

impl TypedResource for StatsResource {
    const KIND: &'static str = "StatsResource";

    fn from_proxy(proxy: ResourceProxy) -> Self {
        Self(proxy)
    }

    fn proxy(&self) -> &ResourceProxy {
        &self.0
    }
}
