//! Conversion between JavaScript values and their wire envelopes
//!
//! Scalars, arrays and plain objects travel by value. Every other object is
//! stored in the [`ResourceRepository`] and travels as a resource envelope.

use boa_engine::{
    object::{builtins::JsArray, ObjectInitializer},
    Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue,
};
use serde_json::{Map, Number, Value as JsonValue};
use tandem_ipc::{protocol::has_marker, ErrorEnvelope, ResourceIdentity, FUNCTION_MARKER};

use crate::engine::{call_runtime, key};
use crate::function::FunctionEnvelope;
use crate::repository::ResourceRepository;

/// Nesting limit for containers, cyclic structures stop here
const MAX_DEPTH: usize = 128;

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn too_deep() -> JsError {
    JsNativeError::range()
        .with_message("Maximum serialization depth exceeded")
        .into()
}

fn number_to_json(number: f64) -> JsonValue {
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::Number(Number::from(number as i64));
    }
    Number::from_f64(number)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn as_rust_string(value: &JsValue) -> Option<String> {
    value.as_string().map(|s| s.to_std_string_escaped())
}

/// Worker value → wire envelope
pub struct Serializer<'a> {
    context: &'a mut Context,
    repository: &'a mut ResourceRepository,
    runtime: &'a JsObject,
}

impl<'a> Serializer<'a> {
    pub fn new(
        context: &'a mut Context,
        repository: &'a mut ResourceRepository,
        runtime: &'a JsObject,
    ) -> Self {
        Self {
            context,
            repository,
            runtime,
        }
    }

    pub fn serialize(&mut self, value: &JsValue) -> JsResult<JsonValue> {
        self.serialize_at(value, 0)
    }

    fn serialize_at(&mut self, value: &JsValue, depth: usize) -> JsResult<JsonValue> {
        if depth > MAX_DEPTH {
            return Err(too_deep());
        }

        if value.is_null_or_undefined() || value.is_symbol() {
            return Ok(JsonValue::Null);
        }
        if let Some(flag) = value.as_boolean() {
            return Ok(JsonValue::Bool(flag));
        }
        if let Some(number) = value.as_number() {
            return Ok(number_to_json(number));
        }
        if let Some(text) = as_rust_string(value) {
            return Ok(JsonValue::String(text));
        }
        if value.is_bigint() {
            return Ok(JsonValue::String(value.display().to_string()));
        }

        let Some(object) = value.as_object() else {
            return Ok(JsonValue::Null);
        };

        if object.is_array() {
            let array = JsArray::from_object(object.clone())?;
            let length = array.length(self.context)?;
            let mut items = Vec::with_capacity(length as usize);
            for index in 0..length {
                let item = array.get(index, self.context)?;
                items.push(self.serialize_at(&item, depth + 1)?);
            }
            return Ok(JsonValue::Array(items));
        }

        let plain = call_runtime(self.runtime, "isPlainObject", &[value.clone()], self.context)?
            .to_boolean();
        if plain {
            return self.serialize_map(object, depth);
        }

        let class_name = call_runtime(self.runtime, "className", &[value.clone()], self.context)?;
        let class_name = as_rust_string(&class_name).unwrap_or_else(|| "Object".to_string());
        let id = self.repository.store(object);

        Ok(ResourceIdentity::new(class_name, id).to_envelope())
    }

    fn serialize_map(&mut self, object: &JsObject, depth: usize) -> JsResult<JsonValue> {
        let keys = call_runtime(
            self.runtime,
            "keys",
            &[JsValue::from(object.clone())],
            self.context,
        )?;
        let keys = keys
            .as_object()
            .cloned()
            .ok_or_else(|| JsNativeError::typ().with_message("object keys are not an array"))?;
        let keys = JsArray::from_object(keys)?;

        let mut map = Map::new();
        for index in 0..keys.length(self.context)? {
            let name = keys.get(index, self.context)?;
            let Some(name) = as_rust_string(&name) else {
                continue;
            };
            let item = object.get(key(&name), self.context)?;
            let item = self.serialize_at(&item, depth + 1)?;
            map.insert(name, item);
        }
        Ok(JsonValue::Object(map))
    }
}

/// Wire envelope → worker value
pub struct Unserializer<'a> {
    context: &'a mut Context,
    repository: &'a ResourceRepository,
}

impl<'a> Unserializer<'a> {
    pub fn new(context: &'a mut Context, repository: &'a ResourceRepository) -> Self {
        Self {
            context,
            repository,
        }
    }

    pub fn unserialize(&mut self, value: &JsonValue) -> JsResult<JsValue> {
        self.unserialize_at(value, 0)
    }

    /// The live object behind a resource identity
    pub fn resolve(&self, identity: &ResourceIdentity) -> JsResult<JsObject> {
        self.repository
            .retrieve(&identity.unique_identifier)
            .cloned()
            .ok_or_else(|| {
                JsNativeError::reference()
                    .with_message(format!(
                        "Unknown resource {} with identifier {}",
                        identity.class_name, identity.unique_identifier
                    ))
                    .into()
            })
    }

    fn unserialize_at(&mut self, value: &JsonValue, depth: usize) -> JsResult<JsValue> {
        if depth > MAX_DEPTH {
            return Err(too_deep());
        }

        match value {
            JsonValue::Null => Ok(JsValue::null()),
            JsonValue::Bool(flag) => Ok(JsValue::from(*flag)),
            JsonValue::Number(number) => Ok(match number.as_i64() {
                Some(integer) if i32::try_from(integer).is_ok() => JsValue::from(integer as i32),
                _ => JsValue::from(number.as_f64().unwrap_or(f64::NAN)),
            }),
            JsonValue::String(text) => Ok(JsValue::from(JsString::from(text.as_str()))),
            JsonValue::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.unserialize_at(item, depth + 1)?);
                }
                Ok(JsArray::from_iter(values, self.context).into())
            }
            JsonValue::Object(map) => {
                if let Some(identity) = ResourceIdentity::from_envelope(value) {
                    return Ok(JsValue::from(self.resolve(&identity)?));
                }
                if has_marker(value, FUNCTION_MARKER) {
                    return self.unserialize_function(value, depth);
                }
                if let Some(error) = ErrorEnvelope::from_envelope(value) {
                    return Ok(self.unserialize_error(&error));
                }
                self.unserialize_map(map, depth)
            }
        }
    }

    fn unserialize_map(&mut self, map: &Map<String, JsonValue>, depth: usize) -> JsResult<JsValue> {
        let object = ObjectInitializer::new(self.context).build();
        for (name, item) in map {
            let item = self.unserialize_at(item, depth + 1)?;
            object.set(key(name), item, true, self.context)?;
        }
        Ok(JsValue::from(object))
    }

    fn unserialize_function(&mut self, value: &JsonValue, depth: usize) -> JsResult<JsValue> {
        let envelope: FunctionEnvelope = serde_json::from_value(value.clone()).map_err(|e| {
            JsError::from(JsNativeError::typ().with_message(format!("Invalid function: {}", e)))
        })?;
        let scope = self.unserialize_map(&envelope.scope, depth)?;

        envelope.compile(scope, self.context)
    }

    fn unserialize_error(&mut self, error: &ErrorEnvelope) -> JsValue {
        let object = JsNativeError::error()
            .with_message(error.message.clone())
            .to_opaque(self.context);
        if let Some(stack) = &error.stack {
            // Best effort, the message alone is still a usable error
            let _ = object.set(
                key("stack"),
                JsValue::from(JsString::from(stack.as_str())),
                true,
                self.context,
            );
        }
        JsValue::from(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::options::WorkerOptions;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::new(WorkerOptions::default()).unwrap()
    }

    #[test]
    fn test_containers_travel_by_value() {
        let mut engine = engine();
        let value = engine
            .eval("({ list: [1, 2.5, 'three', null, true], nested: { deep: [] } })")
            .unwrap();

        let json = engine.serializer().serialize(&value).unwrap();
        assert_eq!(
            json,
            json!({"list": [1, 2.5, "three", null, true], "nested": {"deep": []}})
        );
        assert!(engine.repository().is_empty());
    }

    #[test]
    fn test_class_instances_become_resources() {
        let mut engine = engine();
        let value = engine.eval("require('fs').statSync('.')").unwrap();

        let json = engine.serializer().serialize(&value).unwrap();
        let identity = ResourceIdentity::from_envelope(&json).unwrap();
        assert_eq!(identity.class_name, "Stats");

        let again = engine.serializer().serialize(&value).unwrap();
        assert_eq!(again, json);
        assert_eq!(engine.repository().len(), 1);
    }

    #[test]
    fn test_resources_resolve_back_to_the_same_object() {
        let mut engine = engine();
        let value = engine.eval("new (class Box {})()").unwrap();
        let json = engine.serializer().serialize(&value).unwrap();

        let restored = engine.unserializer().unserialize(&json).unwrap();
        assert!(JsObject::equals(
            restored.as_object().unwrap(),
            value.as_object().unwrap()
        ));
    }

    #[test]
    fn test_unknown_resource_is_a_reference_error() {
        let mut engine = engine();
        let envelope = ResourceIdentity::new("Stats", "42").to_envelope();

        let error = engine.unserializer().unserialize(&envelope).unwrap_err();
        assert!(engine
            .describe_error(&error)
            .stack
            .unwrap()
            .starts_with("ReferenceError"));
    }

    #[test]
    fn test_function_envelopes_compile() {
        let mut engine = engine();
        let envelope = json!({
            FUNCTION_MARKER: true,
            "parameters": {"0": "value"},
            "body": "return value * factor;",
            "scope": {"factor": 3},
            "async": false,
        });

        let function = engine.unserializer().unserialize(&envelope).unwrap();
        let result = function
            .as_callable()
            .unwrap()
            .call(&JsValue::undefined(), &[JsValue::from(14)], engine.context())
            .unwrap();

        assert_eq!(result.as_number(), Some(42.0));
    }

    #[test]
    fn test_error_envelopes_become_errors() {
        let mut engine = engine();
        let envelope = ErrorEnvelope::new("broken", Some("Error: broken".into())).to_envelope();

        let value = engine.unserializer().unserialize(&envelope).unwrap();
        let error = JsError::from_opaque(value);
        assert_eq!(engine.describe_error(&error).message, "broken");
    }

    #[test]
    fn test_cycles_hit_the_depth_limit() {
        let mut engine = engine();
        let value = engine.eval("const a = {}; a.self = a; a").unwrap();
        assert!(engine.serializer().serialize(&value).is_err());
    }
}
