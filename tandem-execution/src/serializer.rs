//! Host values to wire envelopes and back

use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tandem_ipc::{protocol::has_marker, ErrorEnvelope, ResourceIdentity, FUNCTION_MARKER};

use crate::error::SupervisorError;
use crate::proxy::{IdentifiesResource, ResourceProxy};
use crate::supervisor::ProcessSupervisor;
use crate::value::{JsFunction, Parameter, Value};

fn serialize_function(function: &JsFunction) -> Result<JsonValue, SupervisorError> {
    let mut parameters = Map::new();
    for (position, parameter) in function.parameters.iter().enumerate() {
        match parameter {
            Parameter::Positional(name) => {
                parameters.insert(position.to_string(), JsonValue::String(name.clone()));
            }
            Parameter::Named { name, default } => {
                parameters.insert(name.clone(), default.clone());
            }
        }
    }

    let mut scope = Map::new();
    for (name, value) in &function.scope {
        scope.insert(name.clone(), serialize(value)?);
    }

    Ok(json!({
        FUNCTION_MARKER: true,
        "parameters": parameters,
        "body": function.body,
        "scope": scope,
        "async": function.is_async,
    }))
}

/// Wire form of a host value
pub fn serialize(value: &Value) -> Result<JsonValue, SupervisorError> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(flag) => JsonValue::Bool(*flag),
        Value::Number(number) => JsonValue::Number(number.clone()),
        Value::String(text) => JsonValue::String(text.clone()),
        Value::Array(items) => {
            JsonValue::Array(items.iter().map(serialize).collect::<Result<_, _>>()?)
        }
        Value::Object(map) => {
            let mut object = Map::new();
            for (key, item) in map {
                object.insert(key.clone(), serialize(item)?);
            }
            JsonValue::Object(object)
        }
        Value::Function(function) => serialize_function(function)?,
        Value::Resource(proxy) => proxy
            .resource_identity()
            .map(ResourceIdentity::to_envelope)
            .ok_or_else(|| {
                SupervisorError::Protocol(
                    "The default resource cannot be sent as a value".to_string(),
                )
            })?,
    })
}

/// Host form of a reply value.
///
/// Resources become proxies bound to `supervisor`. An error envelope anywhere
/// in the value fails with [`SupervisorError::Remote`].
pub fn unserialize(
    value: JsonValue,
    supervisor: &Arc<ProcessSupervisor>,
) -> Result<Value, SupervisorError> {
    if let Some(error) = remote_error(&value, supervisor.options().debug) {
        return Err(error);
    }
    if let Some(identity) = ResourceIdentity::from_envelope(&value) {
        let kind = supervisor.resource_kind(&identity.class_name);
        return Ok(Value::Resource(ResourceProxy::bound(
            identity,
            kind,
            Arc::clone(supervisor),
        )));
    }
    if has_marker(&value, FUNCTION_MARKER) {
        return Err(SupervisorError::Protocol(
            "Workers cannot return functions by value".to_string(),
        ));
    }

    Ok(match value {
        JsonValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| unserialize(item, supervisor))
                .collect::<Result<_, _>>()?,
        ),
        JsonValue::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| Ok((key, unserialize(item, supervisor)?)))
                .collect::<Result<_, SupervisorError>>()?,
        ),
        scalar => Value::from(scalar),
    })
}

/// [`SupervisorError::Remote`] for an error envelope, with the worker stack
/// appended to the message in debug mode
pub fn remote_error(value: &JsonValue, debug: bool) -> Option<SupervisorError> {
    let envelope = ErrorEnvelope::from_envelope(value)?;
    Some(SupervisorError::Remote {
        message: envelope.describe(debug),
        stack: envelope.stack,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_and_containers() {
        let value = Value::Array(vec![
            Value::from(1),
            Value::from("two"),
            Value::from(json!({"three": [3.5, null]})),
        ]);

        assert_eq!(
            serialize(&value).unwrap(),
            json!([1, "two", {"three": [3.5, null]}])
        );
    }

    #[test]
    fn test_function_envelope() {
        let function = JsFunction::with_body("return a + b * factor;")
            .parameters(["a", "...rest"])
            .named_parameter("b", json!(2))
            .scope("factor", 10);

        assert_eq!(
            serialize(&Value::from(function)).unwrap(),
            json!({
                FUNCTION_MARKER: true,
                "parameters": {"0": "a", "1": "...rest", "b": 2},
                "body": "return a + b * factor;",
                "scope": {"factor": 10},
                "async": false,
            })
        );
    }

    #[test]
    fn test_resources_travel_by_identity() {
        let proxy = ResourceProxy::new();
        proxy
            .set_resource_identity(ResourceIdentity::new("Buffer", "42"))
            .unwrap();

        assert_eq!(
            serialize(&Value::from(proxy)).unwrap(),
            ResourceIdentity::new("Buffer", "42").to_envelope()
        );
    }

    #[test]
    fn test_remote_errors_carry_the_stack_in_debug_mode() {
        let envelope = ErrorEnvelope::new("boom", Some("Error: boom\n    at run".to_string()))
            .to_envelope();

        match remote_error(&envelope, true) {
            Some(SupervisorError::Remote { message, stack }) => {
                assert_eq!(message, "boom\n\nError: boom\n    at run");
                assert_eq!(stack.as_deref(), Some("Error: boom\n    at run"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        match remote_error(&envelope, false) {
            Some(SupervisorError::Remote { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(remote_error(&json!({"message": "boom"}), true).is_none());
    }

    #[test]
    fn test_default_resource_is_not_a_value() {
        let result = serialize(&Value::from(ResourceProxy::new()));
        assert!(matches!(result, Err(SupervisorError::Protocol(_))));
    }
}
