//! Execution of one instruction against the worker's objects

use boa_engine::{JsNativeError, JsObject, JsResult, JsValue};
use serde_json::Value as JsonValue;
use tandem_ipc::{ExecutionMode, Instruction, InstructionType};
use tracing::trace;

use crate::engine::{key, Engine};

/// An instruction together with the defaults its delegate picked for it
#[derive(Debug, Clone)]
pub struct PreparedInstruction {
    pub instruction: Instruction,
    default_resource: Option<JsObject>,
    default_mode: ExecutionMode,
    override_target: Option<JsObject>,
}

impl PreparedInstruction {
    pub fn new(instruction: Instruction, default_mode: ExecutionMode) -> Self {
        Self {
            instruction,
            default_resource: None,
            default_mode,
            override_target: None,
        }
    }

    /// Target used when the instruction names no resource
    pub fn with_default_resource(mut self, resource: Option<JsObject>) -> Self {
        self.default_resource = resource;
        self
    }

    /// Mode used when the instruction carries none
    pub fn with_default_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Target used whatever the instruction names
    pub fn with_overridden_target(mut self, target: Option<JsObject>) -> Self {
        self.override_target = target;
        self
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.instruction.execution_mode.unwrap_or(self.default_mode)
    }

    pub fn should_catch_errors(&self) -> bool {
        self.instruction.catch_errors
    }

    fn target(&self, engine: &mut Engine) -> JsResult<JsObject> {
        if let Some(target) = &self.override_target {
            return Ok(target.clone());
        }
        if let Some(identity) = &self.instruction.resource {
            return engine.unserializer().resolve(identity);
        }
        self.default_resource.clone().ok_or_else(|| {
            JsNativeError::typ()
                .with_message(format!(
                    "No resource to {} \"{}\" on",
                    self.instruction.kind, self.instruction.name
                ))
                .into()
        })
    }

    fn arguments(&self, engine: &mut Engine) -> JsResult<Vec<JsValue>> {
        let mut unserializer = engine.unserializer();
        match &self.instruction.value {
            JsonValue::Null => Ok(Vec::new()),
            JsonValue::Array(values) => values.iter().map(|v| unserializer.unserialize(v)).collect(),
            single => Ok(vec![unserializer.unserialize(single)?]),
        }
    }

    /// Run the instruction and, in eager mode, settle the returned promise
    pub fn execute(&self, engine: &mut Engine) -> JsResult<JsValue> {
        let target = self.target(engine)?;
        let name = self.instruction.name.as_str();
        trace!(kind = %self.instruction.kind, name, "Executing instruction");

        let value = match self.instruction.kind {
            InstructionType::Call => {
                let member = target.get(key(name), engine.context())?;
                let Some(function) = member.as_callable().cloned() else {
                    return Err(engine.not_a_function(&target, name));
                };
                let arguments = self.arguments(engine)?;
                function.call(&JsValue::from(target.clone()), &arguments, engine.context())?
            }
            InstructionType::Get => target.get(key(name), engine.context())?,
            InstructionType::Set => {
                let value = engine.unserializer().unserialize(&self.instruction.value)?;
                target.set(key(name), value.clone(), true, engine.context())?;
                value
            }
        };

        match self.execution_mode() {
            ExecutionMode::Eager => engine.settle(value),
            ExecutionMode::Lazy => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::WorkerOptions;
    use serde_json::json;

    fn setup() -> (Engine, JsObject) {
        let mut engine = Engine::new(WorkerOptions::default()).unwrap();
        let target = engine
            .eval(
                "({ foo: 'bar', add(a, b) { return a + b; }, later() { return Promise.resolve(7); } })",
            )
            .unwrap();
        let target = target.as_object().unwrap().clone();
        (engine, target)
    }

    fn run(engine: &mut Engine, target: &JsObject, instruction: Instruction) -> JsResult<JsonValue> {
        let prepared = PreparedInstruction::new(instruction, ExecutionMode::Eager)
            .with_default_resource(Some(target.clone()));
        let value = prepared.execute(engine)?;
        engine.serializer().serialize(&value)
    }

    #[test]
    fn test_call_get_set() {
        let (mut engine, target) = setup();

        let sum = run(&mut engine, &target, Instruction::call("add", vec![json!(2), json!(3)])).unwrap();
        assert_eq!(sum, json!(5));

        assert_eq!(run(&mut engine, &target, Instruction::get("foo")).unwrap(), json!("bar"));

        let set = run(&mut engine, &target, Instruction::set("foo", json!("baz"))).unwrap();
        assert_eq!(set, json!("baz"));
        assert_eq!(run(&mut engine, &target, Instruction::get("foo")).unwrap(), json!("baz"));
    }

    #[test]
    fn test_eager_and_lazy_promises() {
        let (mut engine, target) = setup();

        let eager = run(&mut engine, &target, Instruction::call("later", vec![])).unwrap();
        assert_eq!(eager, json!(7));

        let lazy = Instruction::call("later", vec![]).with_execution_mode(ExecutionMode::Lazy);
        let lazy = run(&mut engine, &target, lazy).unwrap();
        assert_eq!(lazy["class_name"], json!("Promise"));
    }

    #[test]
    fn test_delegate_default_mode_applies_without_wire_mode() {
        let (mut engine, target) = setup();
        let prepared = PreparedInstruction::new(Instruction::call("later", vec![]), ExecutionMode::Eager)
            .with_default_resource(Some(target))
            .with_default_execution_mode(ExecutionMode::Lazy);

        assert_eq!(prepared.execution_mode(), ExecutionMode::Lazy);
        assert!(prepared.execute(&mut engine).unwrap().is_object());
    }

    #[test]
    fn test_missing_method() {
        let (mut engine, target) = setup();
        let error = run(&mut engine, &target, Instruction::call("nope", vec![])).unwrap_err();

        assert_eq!(
            engine.describe_error(&error).message,
            "Object.nope is not a function"
        );
    }

    #[test]
    fn test_overridden_target_wins() {
        let (mut engine, target) = setup();
        let other = engine.eval("({ foo: 'other' })").unwrap().as_object().unwrap().clone();
        let prepared = PreparedInstruction::new(Instruction::get("foo"), ExecutionMode::Eager)
            .with_default_resource(Some(target))
            .with_overridden_target(Some(other));

        let value = prepared.execute(&mut engine).unwrap();
        assert_eq!(value.as_string().unwrap().to_std_string_escaped(), "other");
    }

    #[test]
    fn test_no_target() {
        let (mut engine, _) = setup();
        let prepared = PreparedInstruction::new(Instruction::get("foo"), ExecutionMode::Eager);
        assert!(prepared.execute(&mut engine).is_err());
    }
}
