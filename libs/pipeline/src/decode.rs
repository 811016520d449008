use bridge_api::Record;
use serde_json::Value;

use crate::DecodeError;

/// Разобрать сырой payload брокера в `Record`.
///
/// Принимается только UTF-8 JSON-объект; массивы и скаляры дают ошибку.
pub fn decode_payload(topic: &str, payload: &[u8]) -> Result<Record, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    match serde_json::from_str::<Value>(text)? {
        Value::Object(body) => Ok(Record::new(topic, body)),
        other => Err(DecodeError::NotAnObject(json_type(&other))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
