//! Utility handlers — pure data-shaping nodes with no external side
//! effects, so they behave identically in simulate and live mode (except
//! `delay`, which only sleeps for real in live runs).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::config::{opt_str, opt_u64, require_str};
use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::{ExecutionMode, NodeError};

// ---------------------------------------------------------------------------
// logMessage
// ---------------------------------------------------------------------------

/// `logMessage` — writes its (resolved) `message` into the run log.
///
/// Output shape: `{ "output": <logged text> }`.
pub struct LogMessageHandler;

#[async_trait]
impl NodeHandler for LogMessageHandler {
    fn node_type(&self) -> &str {
        "logMessage"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let message = match config.get("message") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => serde_json::to_string_pretty(other)
                .map_err(|e| NodeError::Fatal(format!("cannot render message: {e}")))?,
        };

        ctx.logger
            .info(format!("Log message {}: {message}", ctx.identifier()));

        Ok(json!({ "output": message }))
    }
}

// ---------------------------------------------------------------------------
// parseJson
// ---------------------------------------------------------------------------

/// `parseJson` — parses `jsonString` (a string or an already-parsed object)
/// and optionally extracts a dotted `path` (with or without a leading `$.`).
///
/// Output shape: `{ "output": <extracted value> }`.
pub struct ParseJsonHandler;

#[async_trait]
impl NodeHandler for ParseJsonHandler {
    fn node_type(&self) -> &str {
        "parseJson"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let data = match config.get("jsonString") {
            Some(Value::String(s)) if s.trim().is_empty() => json!({}),
            Some(Value::String(s)) => serde_json::from_str(s)
                .map_err(|e| NodeError::Fatal(format!("invalid JSON input string: {e}")))?,
            Some(v @ (Value::Object(_) | Value::Array(_))) => v.clone(),
            other => {
                return Err(NodeError::Fatal(format!(
                    "JSON input must be a string or an object, got {}",
                    type_name(other.unwrap_or(&Value::Null))
                )))
            }
        };

        let path = opt_str(config, "path").unwrap_or("").trim().to_string();
        if path.is_empty() || path == "$" {
            return Ok(json!({ "output": data }));
        }

        let mut current = &data;
        let stripped = path.strip_prefix("$.").unwrap_or(path.strip_prefix('$').unwrap_or(&path));
        for part in stripped.split('.').filter(|p| !p.is_empty()) {
            current = current.get(part).ok_or_else(|| {
                NodeError::Fatal(format!("path \"{path}\" not found in JSON object"))
            })?;
        }

        Ok(json!({ "output": current }))
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// delay
// ---------------------------------------------------------------------------

/// `delay` — sleeps for `delayMs` (live mode only) and passes its mapped
/// input through unchanged.
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    fn node_type(&self) -> &str {
        "delay"
    }

    async fn execute(&self, config: &Value, ctx: &HandlerContext) -> Result<Value, NodeError> {
        let delay_ms = opt_u64(config, "delayMs").unwrap_or(0);
        if ctx.mode == ExecutionMode::Live && delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        Ok(json!({ "output": config.get("input").cloned().unwrap_or(Value::Null) }))
    }
}

// ---------------------------------------------------------------------------
// String utilities
// ---------------------------------------------------------------------------

/// `toUpperCase` — output shape `{ "output_data": <string> }`.
pub struct ToUpperCaseHandler;

#[async_trait]
impl NodeHandler for ToUpperCaseHandler {
    fn node_type(&self) -> &str {
        "toUpperCase"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let input = require_str(config, "inputString")?;
        Ok(json!({ "output_data": input.to_uppercase() }))
    }
}

/// `toLowerCase` — output shape `{ "output_data": <string> }`.
pub struct ToLowerCaseHandler;

#[async_trait]
impl NodeHandler for ToLowerCaseHandler {
    fn node_type(&self) -> &str {
        "toLowerCase"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let input = require_str(config, "inputString")?;
        Ok(json!({ "output_data": input.to_lowercase() }))
    }
}

/// `concatenateStrings` — joins `stringsToConcatenate` with `separator`.
pub struct ConcatenateStringsHandler;

#[async_trait]
impl NodeHandler for ConcatenateStringsHandler {
    fn node_type(&self) -> &str {
        "concatenateStrings"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let items = config
            .get("stringsToConcatenate")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                NodeError::Fatal("'stringsToConcatenate' must be an array of strings".into())
            })?;
        let separator = opt_str(config, "separator").unwrap_or("");

        let parts: Vec<String> = items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();

        Ok(json!({ "output_data": parts.join(separator) }))
    }
}

/// `stringSplit` — output shape `{ "output_data": { "array": [...] } }`.
pub struct StringSplitHandler;

#[async_trait]
impl NodeHandler for StringSplitHandler {
    fn node_type(&self) -> &str {
        "stringSplit"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let input = require_str(config, "inputString")?;
        let delimiter = opt_str(config, "delimiter").unwrap_or(",");
        let parts: Vec<&str> = input.split(delimiter).collect();
        Ok(json!({ "output_data": { "array": parts } }))
    }
}

// ---------------------------------------------------------------------------
// formatDate
// ---------------------------------------------------------------------------

/// `formatDate` — reformats an ISO-8601 `inputDateString` using
/// `outputFormatString` tokens (`yyyy`, `MM`, `dd`, `HH`, `mm`, `ss`).
///
/// Output shape: `{ "output_data": { "formattedDate": <string> } }`.
pub struct FormatDateHandler;

#[async_trait]
impl NodeHandler for FormatDateHandler {
    fn node_type(&self) -> &str {
        "formatDate"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let input = require_str(config, "inputDateString")?;
        let format = opt_str(config, "outputFormatString").unwrap_or("yyyy-MM-dd HH:mm:ss");

        let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(input)
            .map(|t| t.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDate::parse_from_str(input, "%Y-%m-%d")
                    .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
            })
            .map_err(|_| NodeError::Fatal(format!("invalid input date string '{input}'")))?;

        let strftime = translate_format_tokens(format);
        let formatted = parsed.format(&strftime).to_string();

        Ok(json!({ "output_data": { "formattedDate": formatted } }))
    }
}

/// Map the date-token vocabulary used in workflow definitions onto chrono's
/// strftime specifiers. Unknown characters pass through untouched.
fn translate_format_tokens(format: &str) -> String {
    format
        .replace("yyyy", "%Y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunLogger;

    fn ctx(mode: ExecutionMode) -> HandlerContext {
        HandlerContext {
            node_id: "util_1".into(),
            node_name: "Utility".into(),
            mode,
            user_id: "tester".into(),
            logger: RunLogger::new(),
        }
    }

    #[tokio::test]
    async fn log_message_records_and_returns_text() {
        let context = ctx(ExecutionMode::Simulate);
        let out = LogMessageHandler
            .execute(&json!({ "message": "upstream failed: boom" }), &context)
            .await
            .unwrap();
        assert_eq!(out["output"], "upstream failed: boom");
        let logs = context.logger.snapshot();
        assert!(logs[0].message.contains("upstream failed: boom"));
    }

    #[tokio::test]
    async fn parse_json_extracts_dotted_path() {
        let config = json!({
            "jsonString": "{\"user\": {\"name\": \"ada\"}}",
            "path": "$.user.name",
        });
        let out = ParseJsonHandler
            .execute(&config, &ctx(ExecutionMode::Simulate))
            .await
            .unwrap();
        assert_eq!(out["output"], "ada");
    }

    #[tokio::test]
    async fn parse_json_missing_path_is_fatal() {
        let config = json!({ "jsonString": "{\"a\": 1}", "path": "b.c" });
        let err = ParseJsonHandler
            .execute(&config, &ctx(ExecutionMode::Simulate))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Fatal(_)));
    }

    #[tokio::test]
    async fn string_utilities_roundtrip() {
        let c = ctx(ExecutionMode::Simulate);
        let upper = ToUpperCaseHandler
            .execute(&json!({ "inputString": "abc" }), &c)
            .await
            .unwrap();
        assert_eq!(upper["output_data"], "ABC");

        let split = StringSplitHandler
            .execute(&json!({ "inputString": "a|b|c", "delimiter": "|" }), &c)
            .await
            .unwrap();
        assert_eq!(split["output_data"]["array"], json!(["a", "b", "c"]));

        let joined = ConcatenateStringsHandler
            .execute(
                &json!({ "stringsToConcatenate": ["a", "b", 3], "separator": "-" }),
                &c,
            )
            .await
            .unwrap();
        assert_eq!(joined["output_data"], "a-b-3");
    }

    #[tokio::test]
    async fn format_date_translates_tokens() {
        let config = json!({
            "inputDateString": "2024-03-05T07:08:09Z",
            "outputFormatString": "yyyy/MM/dd HH:mm:ss",
        });
        let out = FormatDateHandler
            .execute(&config, &ctx(ExecutionMode::Simulate))
            .await
            .unwrap();
        assert_eq!(out["output_data"]["formattedDate"], "2024/03/05 07:08:09");
    }

    #[tokio::test]
    async fn delay_in_simulation_does_not_sleep() {
        let start = std::time::Instant::now();
        let out = DelayHandler
            .execute(
                &json!({ "delayMs": 5000, "input": {"x": 1} }),
                &ctx(ExecutionMode::Simulate),
            )
            .await
            .unwrap();
        assert!(start.elapsed() < std::time::Duration::from_millis(500));
        assert_eq!(out["output"], json!({"x": 1}));
    }
}
