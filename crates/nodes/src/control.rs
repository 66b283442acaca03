//! Control-flow handlers — branching, aggregation, and per-item mapping.
//!
//! These are pure and mode-independent. Branching composes with the
//! engine's `_flow_run_condition` gate: a `conditionalBranch` node exposes
//! its verdict as output, and downstream nodes gate themselves on it.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::opt_str;
use crate::context::HandlerContext;
use crate::traits::NodeHandler;
use crate::NodeError;

// ---------------------------------------------------------------------------
// conditionalBranch
// ---------------------------------------------------------------------------

/// `conditionalBranch` — compares `value` against `compareTo` with
/// `operator` (`equals`, `notEquals`, `contains`, `greaterThan`,
/// `lessThan`, `exists`).
///
/// Output shape: `{ "result": <bool>, "branch": "true"|"false" }`.
pub struct ConditionalBranchHandler;

#[async_trait]
impl NodeHandler for ConditionalBranchHandler {
    fn node_type(&self) -> &str {
        "conditionalBranch"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let value = config.get("value").cloned().unwrap_or(Value::Null);
        let compare_to = config.get("compareTo").cloned().unwrap_or(Value::Null);
        let operator = opt_str(config, "operator").unwrap_or("equals");

        let result = match operator {
            "equals" => loose_equals(&value, &compare_to),
            "notEquals" => !loose_equals(&value, &compare_to),
            "contains" => match (&value, &compare_to) {
                (Value::String(s), needle) => s.contains(&display(needle)),
                (Value::Array(items), needle) => items.iter().any(|i| loose_equals(i, needle)),
                _ => false,
            },
            "greaterThan" => match (as_number(&value), as_number(&compare_to)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            "lessThan" => match (as_number(&value), as_number(&compare_to)) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            "exists" => !value.is_null(),
            other => {
                return Err(NodeError::Fatal(format!(
                    "unknown comparison operator '{other}'"
                )))
            }
        };

        Ok(json!({
            "result": result,
            "branch": if result { "true" } else { "false" },
        }))
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_equals(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => display(a) == display(b),
    }
}

// ---------------------------------------------------------------------------
// aggregate
// ---------------------------------------------------------------------------

/// `aggregate` — collects either an explicit `items` array or the node's
/// mapped input bindings into a single output.
///
/// Output shape: `{ "output": { "items": [...], "count": n } }` for arrays,
/// `{ "output": <bindings object> }` otherwise.
pub struct AggregateHandler;

#[async_trait]
impl NodeHandler for AggregateHandler {
    fn node_type(&self) -> &str {
        "aggregate"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        if let Some(items) = config.get("items").and_then(Value::as_array) {
            return Ok(json!({
                "output": { "items": items, "count": items.len() }
            }));
        }
        let input = config.get("input").cloned().unwrap_or_else(|| json!({}));
        Ok(json!({ "output": input }))
    }
}

// ---------------------------------------------------------------------------
// forEach
// ---------------------------------------------------------------------------

/// `forEach` — renders `itemTemplate` once per element of `items`, with
/// `{{item}}` / `{{item.path}}` placeholders bound to the current element.
/// The engine copies `itemTemplate` through unresolved; substitution is
/// local to this handler.
///
/// Output shape: `{ "results": [...], "count": n }`.
pub struct ForEachHandler;

#[async_trait]
impl NodeHandler for ForEachHandler {
    fn node_type(&self) -> &str {
        "forEach"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        let items = config
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| NodeError::Fatal("'items' must be an array".into()))?;
        let template = config
            .get("itemTemplate")
            .cloned()
            .unwrap_or(Value::String("{{item}}".into()));

        let results: Vec<Value> = items
            .iter()
            .map(|item| substitute_item(&template, item))
            .collect();

        Ok(json!({ "results": results, "count": results.len() }))
    }
}

/// Replace `{{item}}` / `{{item.path}}` placeholders throughout a template
/// value. A string that is exactly one placeholder keeps the referenced
/// value's type; embedded placeholders stringify (objects as JSON).
fn substitute_item(template: &Value, item: &Value) -> Value {
    match template {
        Value::String(s) => substitute_item_str(s, item),
        Value::Array(items) => {
            Value::Array(items.iter().map(|t| substitute_item(t, item)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_item(v, item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_item_str(template: &str, item: &Value) -> Value {
    let mut out = String::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start..].find("}}") else {
            break;
        };
        let end = start + end_rel;
        let inner = rest[start + 2..end].trim();

        let resolved = item_path(inner, item);
        match resolved {
            Some(value) => {
                // Whole string is one placeholder: keep the value's type.
                if start == 0 && end + 2 == rest.len() && out.is_empty() {
                    return value;
                }
                out.push_str(&rest[..start]);
                out.push_str(&embed(&value));
            }
            // Not an item reference; leave the placeholder text alone.
            None => out.push_str(&rest[..end + 2]),
        }
        rest = &rest[end + 2..];
    }

    out.push_str(rest);
    Value::String(out)
}

fn item_path(expr: &str, item: &Value) -> Option<Value> {
    if expr == "item" {
        return Some(item.clone());
    }
    let path = expr.strip_prefix("item.")?;
    let mut current = item;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

fn embed(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// noOp
// ---------------------------------------------------------------------------

/// `noOp` — passes its mapped input through unchanged. Useful as a junction
/// point when rewiring graphs.
pub struct NoOpHandler;

#[async_trait]
impl NodeHandler for NoOpHandler {
    fn node_type(&self) -> &str {
        "noOp"
    }

    async fn execute(&self, config: &Value, _ctx: &HandlerContext) -> Result<Value, NodeError> {
        Ok(json!({ "output": config.get("input").cloned().unwrap_or(Value::Null) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionMode, RunLogger};

    fn ctx() -> HandlerContext {
        HandlerContext {
            node_id: "ctl_1".into(),
            node_name: "Control".into(),
            mode: ExecutionMode::Simulate,
            user_id: "tester".into(),
            logger: RunLogger::new(),
        }
    }

    #[tokio::test]
    async fn branch_compares_numbers_loosely() {
        let out = ConditionalBranchHandler
            .execute(
                &json!({ "value": "42", "operator": "equals", "compareTo": 42 }),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(out["result"], true);
        assert_eq!(out["branch"], "true");
    }

    #[tokio::test]
    async fn branch_greater_than() {
        let out = ConditionalBranchHandler
            .execute(
                &json!({ "value": 10, "operator": "greaterThan", "compareTo": 5 }),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(out["result"], true);
    }

    #[tokio::test]
    async fn branch_unknown_operator_is_fatal() {
        let err = ConditionalBranchHandler
            .execute(&json!({ "value": 1, "operator": "matches" }), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Fatal(_)));
    }

    #[tokio::test]
    async fn aggregate_wraps_items() {
        let out = AggregateHandler
            .execute(&json!({ "items": [1, 2, 3] }), &ctx())
            .await
            .unwrap();
        assert_eq!(out["output"]["count"], 3);
    }

    #[tokio::test]
    async fn for_each_substitutes_paths() {
        let config = json!({
            "items": [{"name": "a", "n": 1}, {"name": "b", "n": 2}],
            "itemTemplate": {"label": "row {{item.name}}", "value": "{{item.n}}"},
        });
        let out = ForEachHandler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["results"][0]["label"], "row a");
        // Pure placeholder keeps the underlying type.
        assert_eq!(out["results"][1]["value"], 2);
    }

    #[tokio::test]
    async fn for_each_leaves_foreign_placeholders() {
        let config = json!({
            "items": [1],
            "itemTemplate": "{{other.ref}} and {{item}}",
        });
        let out = ForEachHandler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(out["results"][0], "{{other.ref}} and 1");
    }
}
