//! Values exchanged with a worker, as seen by the host

use serde_json::{Number, Value as JsonValue};
use std::collections::BTreeMap;

use crate::proxy::ResourceProxy;

/// A parameter of a [`JsFunction`]
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// `name`, or `...name` for a rest parameter
    Positional(String),
    /// `name = default`
    Named { name: String, default: JsonValue },
}

/// A JavaScript function written on the host and compiled by the worker.
///
/// Scope entries become local variables of the function body and may hold
/// any value, resources included.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsFunction {
    pub parameters: Vec<Parameter>,
    pub body: String,
    pub scope: BTreeMap<String, Value>,
    pub is_async: bool,
}

impl JsFunction {
    /// A function with a body and no parameters
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Append positional parameters
    pub fn parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters
            .extend(names.into_iter().map(|name| Parameter::Positional(name.into())));
        self
    }

    /// Append a parameter with a default value
    pub fn named_parameter(mut self, name: impl Into<String>, default: JsonValue) -> Self {
        self.parameters.push(Parameter::Named {
            name: name.into(),
            default,
        });
        self
    }

    /// Bind a variable visible from the body
    pub fn scope(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope.insert(name.into(), value.into());
        self
    }

    pub fn asynchronous(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }
}

/// Anything a worker can receive or return
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Function(JsFunction),
    Resource(ResourceProxy),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(number) => number.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceProxy> {
        match self {
            Value::Resource(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_resource(self) -> Option<ResourceProxy> {
        match self {
            Value::Resource(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Member of an object value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(flag) => Value::Bool(flag),
            JsonValue::Number(number) => Value::Number(number),
            JsonValue::String(text) => Value::String(text),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Number(number.into())
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Value::Number(number.into())
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<JsFunction> for Value {
    fn from(function: JsFunction) -> Self {
        Value::Function(function)
    }
}

impl From<ResourceProxy> for Value {
    fn from(proxy: ResourceProxy) -> Self {
        Value::Resource(proxy)
    }
}
