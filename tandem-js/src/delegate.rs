//! Connection delegates: what an instruction without a resource targets

use boa_engine::{JsObject, JsString, JsValue};
use std::path::{Path, PathBuf};
use tandem_ipc::{ExecutionMode, Instruction};
use tracing::{debug, info};

use crate::engine::{key, Engine};
use crate::error::WorkerError;
use crate::handlers::InstructionHandlers;
use crate::instruction::PreparedInstruction;

/// Decides how instructions are prepared and answered
pub trait ConnectionDelegate {
    /// Attach the defaults an instruction runs with
    fn prepare_instruction(
        &self,
        instruction: Instruction,
        engine: &mut Engine,
    ) -> Result<PreparedInstruction, WorkerError> {
        Ok(PreparedInstruction::new(
            instruction,
            engine.options().default_execution_mode,
        ))
    }

    /// Execute the instruction and answer through `handlers`.
    ///
    /// Failures are answered with an error envelope when the instruction asked
    /// for it, otherwise they stop the worker.
    fn handle_instruction(
        &self,
        prepared: PreparedInstruction,
        engine: &mut Engine,
        handlers: &mut InstructionHandlers,
    ) -> Result<(), WorkerError> {
        let outcome = prepared
            .execute(engine)
            .and_then(|value| engine.serializer().serialize(&value));

        match outcome {
            Ok(value) => handlers.respond(value),
            Err(error) => {
                let envelope = engine.describe_error(&error);
                if prepared.should_catch_errors() {
                    handlers.fail(envelope)
                } else {
                    Err(WorkerError::Uncaught(envelope))
                }
            }
        }
    }
}

/// Delegate backed by a script module.
///
/// The module either exports a subclass of `ConnectionDelegate` from
/// `require('tandem')`, whose `prepareInstruction` picks the defaults, or any
/// other object, which then becomes the default resource.
pub struct ScriptDelegate {
    path: PathBuf,
    exports: JsValue,
    instance: Option<JsObject>,
}

impl ScriptDelegate {
    pub fn load(path: &Path, engine: &mut Engine) -> Result<Self, WorkerError> {
        let load_error = |message: String| WorkerError::DelegateLoad {
            path: path.to_path_buf(),
            message,
        };

        let source = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let exports = engine.evaluate_module(&source).map_err(|e| {
            let envelope = engine.describe_error(&e);
            load_error(envelope.message)
        })?;

        let instance = engine
            .call_runtime("instantiateDelegate", &[exports.clone()])
            .map_err(|e| load_error(engine.describe_error(&e).message))?
            .as_object()
            .cloned();

        info!(
            path = %path.display(),
            subclass = instance.is_some(),
            "Loaded connection delegate"
        );
        Ok(Self {
            path: path.to_path_buf(),
            exports,
            instance,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn object_property(settings: &JsObject, name: &str, engine: &mut Engine) -> Result<Option<JsObject>, WorkerError> {
    let value = settings.get(key(name), engine.context())?;
    Ok(value.as_object().cloned())
}

impl ConnectionDelegate for ScriptDelegate {
    fn prepare_instruction(
        &self,
        instruction: Instruction,
        engine: &mut Engine,
    ) -> Result<PreparedInstruction, WorkerError> {
        let default_mode = engine.options().default_execution_mode;

        let Some(instance) = &self.instance else {
            return Ok(PreparedInstruction::new(instruction, default_mode)
                .with_default_resource(self.exports.as_object().cloned()));
        };

        let settings = engine.call_runtime(
            "prepareInstruction",
            &[
                JsValue::from(instance.clone()),
                JsValue::from(JsString::from(instruction.kind.to_string().as_str())),
                JsValue::from(JsString::from(instruction.name.as_str())),
                JsValue::from(instruction.catch_errors),
            ],
        );
        let settings = match settings {
            Ok(settings) => settings,
            Err(error) => return Err(WorkerError::Uncaught(engine.describe_error(&error))),
        };
        let Some(settings) = settings.as_object().cloned() else {
            return Ok(PreparedInstruction::new(instruction, default_mode));
        };

        let default_resource = object_property(&settings, "defaultResource", engine)?;
        let overridden = object_property(&settings, "overriddenResource", engine)?;
        let mode = settings.get(key("defaultExecutionType"), engine.context())?;
        let mode = match mode.as_string() {
            Some(text) => text
                .to_std_string_escaped()
                .parse::<ExecutionMode>()
                .map_err(|e| WorkerError::Config(e.to_string()))?,
            None => default_mode,
        };

        debug!(name = %instruction.name, ?mode, "Prepared instruction");
        Ok(PreparedInstruction::new(instruction, default_mode)
            .with_default_resource(default_resource)
            .with_default_execution_mode(mode)
            .with_overridden_target(overridden))
    }
}
