//! Compilation of host-defined callbacks
//!
//! The host sends functions as `{parameters, body, scope, async}`. They are
//! turned into JavaScript source once, here, and evaluated by the engine.

use boa_engine::{Context, JsNativeError, JsResult, JsValue, Source};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

/// A function sent by the host
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionEnvelope {
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub scope: Map<String, JsonValue>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn invalid_name(kind: &str, name: &str) -> boa_engine::JsError {
    JsNativeError::syntax()
        .with_message(format!("Invalid {} name \"{}\"", kind, name))
        .into()
}

impl FunctionEnvelope {
    /// Render the parameter list. Numeric keys are positional parameters
    /// (the value is the name), other keys are named parameters whose value is
    /// the default.
    fn parameter_list(&self) -> JsResult<String> {
        let mut rendered = Vec::with_capacity(self.parameters.len());

        for (key, value) in &self.parameters {
            if key.parse::<usize>().is_ok() {
                let name = value.as_str().unwrap_or_default();
                let bare = name.strip_prefix("...").unwrap_or(name);
                if !is_identifier(bare) {
                    return Err(invalid_name("parameter", name));
                }
                rendered.push(name.to_string());
            } else {
                if !is_identifier(key) {
                    return Err(invalid_name("parameter", key));
                }
                rendered.push(format!("{} = {}", key, value));
            }
        }

        Ok(rendered.join(", "))
    }

    /// A function expression taking the scope object and returning the
    /// callback with every scope entry bound as a local variable
    pub fn source(&self) -> JsResult<String> {
        let mut bindings = String::new();
        for name in self.scope.keys() {
            if !is_identifier(name) {
                return Err(invalid_name("scope variable", name));
            }
            bindings.push_str(&format!(
                "    var {} = __scope[{}];\n",
                name,
                JsonValue::String(name.clone())
            ));
        }

        Ok(format!(
            "(function (__scope) {{\n{}    return {}function ({}) {{\n{}\n    }};\n}})",
            bindings,
            if self.is_async { "async " } else { "" },
            self.parameter_list()?,
            self.body
        ))
    }

    /// Compile against an already unserialized `scope` object
    pub fn compile(&self, scope: JsValue, context: &mut Context) -> JsResult<JsValue> {
        let source = self.source()?;
        let factory = context.eval(Source::from_bytes(source.as_bytes()))?;
        let factory = factory
            .as_callable()
            .cloned()
            .ok_or_else(|| JsNativeError::typ().with_message("function factory is not callable"))?;

        factory.call(&JsValue::undefined(), &[scope], context)
    }
}
