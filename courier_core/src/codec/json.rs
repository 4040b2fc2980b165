use crate::codec::{JsonConverter, PropertyAccessor};
use crate::descriptor::ParamKind;
use crate::error::FxError;
use crate::value::{ObjectValue, Value};

/// serde_json-backed converter and property accessor.
#[derive(Copy, Clone, Debug, Default)]
pub struct SerdeJsonConverter;

impl JsonConverter for SerdeJsonConverter {
    fn encode(&self, value: &Value) -> Result<String, FxError> {
        let json = value.to_json()?;
        Ok(serde_json::to_string(&json)?)
    }

    fn decode(&self, text: &str, shape: ParamKind) -> Result<Value, FxError> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        let value = Value::from_json(json);
        match (shape, &value) {
            (ParamKind::Collection | ParamKind::Array, Value::List(_))
            | (ParamKind::Map | ParamKind::Object, Value::Map(_))
            | (ParamKind::Scalar | ParamKind::Text, _)
            | (_, Value::Null) => Ok(value),
            (shape, other) => {
                Err(format!("expected {shape:?}, JSON decoded to {}", other.kind_name()).into())
            }
        }
    }
}

impl PropertyAccessor for SerdeJsonConverter {
    fn object_to_map(&self, object: &ObjectValue) -> Result<Vec<(String, Value)>, FxError> {
        match object.to_json()? {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(v)))
                .collect()),
            other => Err(format!(
                "{} does not serialize to an object (got {})",
                object.type_name(),
                json_kind(&other)
            )
            .into()),
        }
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
