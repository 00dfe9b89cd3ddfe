//! The Boa context of a worker and the runtime glue around it

use boa_engine::{
    builtins::promise::PromiseState,
    job::SimpleJobQueue,
    object::builtins::JsPromise,
    property::PropertyKey,
    Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, Source,
};
use serde_json::Value as JsonValue;
use std::rc::Rc;
use tandem_ipc::{ConsoleEntry, ErrorEnvelope};
use tracing::{debug, trace};

use crate::error::WorkerError;
use crate::natives;
use crate::options::WorkerOptions;
use crate::repository::ResourceRepository;
use crate::serializer::{Serializer, Unserializer};

const PRELUDE: &str = include_str!("prelude.js");

/// Property key from a Rust string
pub(crate) fn key(name: &str) -> PropertyKey {
    PropertyKey::from(JsString::from(name))
}

/// Call a function of the prelude's runtime object
pub(crate) fn call_runtime(
    runtime: &JsObject,
    name: &str,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let helper = runtime.get(key(name), context)?;
    let helper = helper.as_callable().cloned().ok_or_else(|| {
        JsNativeError::typ().with_message(format!("runtime helper {} is missing", name))
    })?;

    helper.call(&JsValue::from(runtime.clone()), args, context)
}

fn read_string(object: &JsObject, name: &str, context: &mut Context) -> Option<String> {
    object
        .get(key(name), context)
        .ok()
        .and_then(|value| value.as_string().map(|s| s.to_std_string_escaped()))
        .filter(|value| !value.is_empty())
}

/// One JavaScript realm serving one host
pub struct Engine {
    context: Context,
    repository: ResourceRepository,
    runtime: JsObject,
    options: WorkerOptions,
}

impl Engine {
    /// Create the context, install the natives and evaluate the prelude
    pub fn new(options: WorkerOptions) -> Result<Self, WorkerError> {
        let mut context = Context::builder()
            .job_queue(Rc::new(SimpleJobQueue::new()))
            .build()?;
        let repository = ResourceRepository::new();

        natives::register(&mut context)?;

        let options_value = Unserializer::new(&mut context, &repository)
            .unserialize(&JsonValue::Object(options.raw.clone()))?;
        context
            .global_object()
            .set(key("__tandem_options"), options_value, true, &mut context)?;

        let runtime = context
            .eval(Source::from_bytes(PRELUDE))?
            .as_object()
            .cloned()
            .ok_or_else(|| WorkerError::Engine("the prelude did not return its runtime".into()))?;

        debug!("JavaScript engine initialized");
        Ok(Self {
            context,
            repository,
            runtime,
            options,
        })
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn context(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn repository(&self) -> &ResourceRepository {
        &self.repository
    }

    pub fn serializer(&mut self) -> Serializer<'_> {
        Serializer::new(&mut self.context, &mut self.repository, &self.runtime)
    }

    pub fn unserializer(&mut self) -> Unserializer<'_> {
        Unserializer::new(&mut self.context, &self.repository)
    }

    /// Call a function of the prelude's runtime object
    pub fn call_runtime(&mut self, name: &str, args: &[JsValue]) -> JsResult<JsValue> {
        call_runtime(&self.runtime, name, args, &mut self.context)
    }

    /// Evaluate plain script source in the global scope
    pub fn eval(&mut self, source: &str) -> JsResult<JsValue> {
        self.context.eval(Source::from_bytes(source.as_bytes()))
    }

    /// Evaluate CommonJS-style module source and return its `module.exports`
    pub fn evaluate_module(&mut self, source: &str) -> JsResult<JsValue> {
        let factory = self.eval(&format!(
            "(function (module, exports, require, options) {{\n{}\n}})",
            source
        ))?;
        self.call_runtime("evaluateModule", &[factory])
    }

    /// The error thrown when `member` of `target` is not callable
    pub fn not_a_function(&mut self, target: &JsObject, member: &str) -> JsError {
        let name = self
            .call_runtime("targetName", &[JsValue::from(target.clone())])
            .ok()
            .and_then(|value| value.as_string().map(|s| s.to_std_string_escaped()))
            .unwrap_or_else(|| "Object".to_string());

        JsNativeError::typ()
            .with_message(format!("{}.{} is not a function", name, member))
            .into()
    }

    /// Turn any thrown value into an error envelope
    pub fn describe_error(&mut self, error: &JsError) -> ErrorEnvelope {
        let value = error.to_opaque(&mut self.context);

        match value.as_object() {
            Some(object) => {
                let name = read_string(object, "name", &mut self.context)
                    .unwrap_or_else(|| "Error".to_string());
                let message = read_string(object, "message", &mut self.context).unwrap_or_default();
                let stack = read_string(object, "stack", &mut self.context)
                    .unwrap_or_else(|| format!("{}: {}", name, message));
                ErrorEnvelope::new(message, Some(stack))
            }
            None => {
                let text = value.display().to_string();
                ErrorEnvelope::new(text.clone(), Some(text))
            }
        }
    }

    /// Run pending jobs until `value` settles when it is a promise
    pub fn settle(&mut self, value: JsValue) -> JsResult<JsValue> {
        let Some(promise) = value
            .as_object()
            .and_then(|object| JsPromise::from_object(object.clone()).ok())
        else {
            return Ok(value);
        };

        trace!("Running jobs until the returned promise settles");
        self.context.run_jobs();

        match promise.state() {
            PromiseState::Fulfilled(result) => Ok(result),
            PromiseState::Rejected(reason) => Err(JsError::from_opaque(reason)),
            PromiseState::Pending => Err(JsNativeError::error()
                .with_message("The returned promise never settled")
                .into()),
        }
    }

    /// Take the console output captured since the last call
    pub fn drain_console(&mut self) -> Result<Vec<ConsoleEntry>, WorkerError> {
        let drained = self.call_runtime("drainConsole", &[])?;
        let text = drained
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .unwrap_or_else(|| "[]".to_string());

        Ok(serde_json::from_str(&text)?)
    }
}
