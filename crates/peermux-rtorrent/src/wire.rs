//! Line-RPC envelopes and return-type coercion.
//!
//! The engine is loose about scalar types (integers arrive as strings,
//! booleans as 0/1); every coercion lives here so call sites stay typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound call envelope, one per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, unique per session.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

/// Inbound reply envelope, one per line.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Correlation id echoed by the engine.
    pub id: u64,
    /// Successful payload.
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Coerce a scalar into u64: accepts numbers and numeric strings.
#[must_use]
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Coerce a scalar into bool: accepts booleans and 0/1 in number or
/// string form.
#[must_use]
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        other => as_u64(other).map(|number| number != 0),
    }
}

/// Coerce a scalar into a string slice.
#[must_use]
pub fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}

/// Fetch and coerce an object field into u64, defaulting to zero.
#[must_use]
pub fn field_u64(object: &Value, key: &str) -> u64 {
    object.get(key).and_then(as_u64).unwrap_or_default()
}

/// Fetch and coerce an object field into bool, defaulting to false.
#[must_use]
pub fn field_bool(object: &Value, key: &str) -> bool {
    object.get(key).and_then(as_bool).unwrap_or_default()
}

/// Fetch an object field as an owned string, defaulting to empty.
#[must_use]
pub fn field_str(object: &Value, key: &str) -> String {
    object
        .get(key)
        .and_then(as_str)
        .unwrap_or_default()
        .to_string()
}
