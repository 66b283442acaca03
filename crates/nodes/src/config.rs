//! Small accessors for reading typed fields out of a resolved node config.
//!
//! Handlers receive config as `serde_json::Value`; these helpers keep the
//! "required field missing" error messages uniform across handler families.

use serde_json::Value;

use crate::NodeError;

/// Fetch a required string field.
///
/// # Errors
/// `NodeError::Fatal` if the field is absent or not a string.
pub fn require_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, NodeError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| NodeError::Fatal(format!("'{key}' is not configured or resolved")))
}

/// Fetch an optional string field.
pub fn opt_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// Fetch an optional unsigned integer field (also accepts numeric strings).
pub fn opt_u64(config: &Value, key: &str) -> Option<u64> {
    match config.get(key) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

/// Fetch an optional field that may arrive either as a JSON value or as a
/// string containing JSON (a common shape for `simulated*` fields pasted
/// into the editor). Strings that fail to parse are returned as-is.
pub fn json_or_string(config: &Value, key: &str) -> Option<Value> {
    match config.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            Some(serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())))
        }
        Some(other) => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_str_errors_on_missing_field() {
        let config = json!({ "url": "https://example.com" });
        assert_eq!(require_str(&config, "url").unwrap(), "https://example.com");
        assert!(matches!(
            require_str(&config, "method"),
            Err(NodeError::Fatal(_))
        ));
    }

    #[test]
    fn opt_u64_accepts_numeric_strings() {
        let config = json!({ "a": 7, "b": "12", "c": "nope" });
        assert_eq!(opt_u64(&config, "a"), Some(7));
        assert_eq!(opt_u64(&config, "b"), Some(12));
        assert_eq!(opt_u64(&config, "c"), None);
    }

    #[test]
    fn json_or_string_parses_embedded_json() {
        let config = json!({ "sim": "{\"id\":42}", "raw": {"x": 1}, "text": "plain" });
        assert_eq!(json_or_string(&config, "sim").unwrap(), json!({"id": 42}));
        assert_eq!(json_or_string(&config, "raw").unwrap(), json!({"x": 1}));
        assert_eq!(json_or_string(&config, "text").unwrap(), json!("plain"));
        assert_eq!(json_or_string(&config, "missing"), None);
    }
}
