//! Performance oriented JSON manipulation.

use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Extension trait for [`serde_json_bytes::Value`].
pub trait ValueExt {
    /// The JSON type name of this value, used in diagnostics.
    fn json_type_name(&self) -> &'static str;

    /// Compact JSON text for this value.
    ///
    /// Errors carry received input as text so they stay cheap to clone and compare.
    fn to_json_text(&self) -> String;
}

impl ValueExt for Value {
    fn json_type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn to_json_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
