//! Input mapper — builds a node's local input bindings and resolved config.
//!
//! `inputMapping` values may reach across the graph (`{{nodeId.path}}`,
//! `{{credential.*}}`, `{{env.*}}`); the resolved results become local
//! bindings. `config` values may then reference only those local names,
//! credentials, env, or literals — the indirection that keeps node
//! configuration self-contained and testable in isolation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use nodes::RunLogger;

use crate::models::Node;
use crate::template::{
    resolve_value, CredentialStore, CrossNodePolicy, ResolveError, ResolverContext,
};

/// Keys whose values carry their own placeholder scope and must reach the
/// handler verbatim: retry policy (consumed by the scheduler, not a
/// template) and per-item templates rendered inside `forEach`.
const VERBATIM_KEYS: &[&str] = &["retry", "itemTemplate"];

/// Result of resolving one node's inputs.
#[derive(Debug, Clone)]
pub struct ResolvedInputs {
    /// The local bindings produced by `inputMapping` — recorded into the
    /// node's context entry as its `input` snapshot.
    pub bindings: Map<String, Value>,
    /// The fully resolved config handed to the handler. Includes the
    /// bindings under the `input` key for handlers that pass them through.
    pub config: Map<String, Value>,
}

/// Resolve a node's `inputMapping` and `config` against the accumulated
/// workflow data.
///
/// # Errors
/// Any unresolvable placeholder fails the whole node, attributed to this
/// (consuming) node rather than the referenced one.
pub async fn resolve_node_inputs(
    node: &Node,
    workflow_data: &Map<String, Value>,
    env: &HashMap<String, String>,
    credentials: &dyn CredentialStore,
    user_id: &str,
    logger: &RunLogger,
) -> Result<ResolvedInputs, ResolveError> {
    // 1. Mapping expressions may cross the graph.
    let empty = Map::new();
    let mapping_cx = ResolverContext {
        workflow_data,
        locals: &empty,
        env,
        credentials,
        user_id,
        cross_node: CrossNodePolicy::Allow,
        logger,
    };

    let mut bindings = Map::new();
    if let Some(mapping) = &node.input_mapping {
        for (name, expression) in mapping {
            let value = resolve_value(expression, &mapping_cx).await?;
            bindings.insert(name.clone(), value);
        }
    }

    // 2. Config sees only the bindings (plus credential/env scopes).
    let config_cx = ResolverContext {
        workflow_data,
        locals: &bindings,
        env,
        credentials,
        user_id,
        cross_node: CrossNodePolicy::Deny,
        logger,
    };

    let mut config = Map::new();
    for (key, value) in &node.config {
        if key == "inputMapping" {
            continue;
        }
        if VERBATIM_KEYS.contains(&key.as_str()) {
            config.insert(key.clone(), value.clone());
            continue;
        }
        config.insert(key.clone(), resolve_deep(value, &config_cx).await?);
    }

    config.insert("input".to_string(), Value::Object(bindings.clone()));

    Ok(ResolvedInputs { bindings, config })
}

/// Recursively resolve a config value: objects and arrays are walked,
/// scalars go through the template resolver.
fn resolve_deep<'a>(
    value: &'a Value,
    cx: &'a ResolverContext<'a>,
) -> Pin<Box<dyn Future<Output = Result<Value, ResolveError>> + Send + 'a>> {
    Box::pin(async move {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, inner) in map {
                    if VERBATIM_KEYS.contains(&key.as_str()) {
                        out.insert(key.clone(), inner.clone());
                    } else {
                        out.insert(key.clone(), resolve_deep(inner, cx).await?);
                    }
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(resolve_deep(item, cx).await?);
                }
                Ok(Value::Array(out))
            }
            other => resolve_value(other, cx).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::InMemoryCredentials;
    use serde_json::json;

    fn make_node(config: Value, input_mapping: Option<Value>) -> Node {
        Node {
            id: "n1".into(),
            node_type: "mock".into(),
            name: "Node".into(),
            config: config.as_object().cloned().unwrap_or_default(),
            input_mapping: input_mapping.and_then(|m| m.as_object().cloned()),
            position: None,
        }
    }

    fn workflow_data() -> Map<String, Value> {
        json!({
            "http_node": {
                "response": { "id": 42 },
                "lastExecutionStatus": "success"
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn mapping_binds_cross_node_values_into_config() {
        let node = make_node(
            json!({
                "queryText": "SELECT * FROM t WHERE id=$1",
                "queryParams": ["{{id}}"]
            }),
            Some(json!({ "id": "{{http_node.response.id}}" })),
        );

        let resolved = resolve_node_inputs(
            &node,
            &workflow_data(),
            &HashMap::new(),
            &InMemoryCredentials::new(),
            "user-1",
            &RunLogger::new(),
        )
        .await
        .unwrap();

        assert_eq!(resolved.bindings["id"], json!(42));
        assert_eq!(resolved.config["queryParams"], json!([42]));
        assert_eq!(resolved.config["input"]["id"], json!(42));
    }

    #[tokio::test]
    async fn config_may_not_reference_other_nodes_directly() {
        let node = make_node(json!({ "message": "{{http_node.response.id}}" }), None);

        let err = resolve_node_inputs(
            &node,
            &workflow_data(),
            &HashMap::new(),
            &InMemoryCredentials::new(),
            "user-1",
            &RunLogger::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResolveError::CrossNodeInConfig { .. }));
    }

    #[tokio::test]
    async fn retry_and_item_template_pass_through_verbatim() {
        let node = make_node(
            json!({
                "retry": { "attempts": 3, "delayMs": 100 },
                "itemTemplate": { "label": "{{item.name}}" },
                "items": "{{rows}}"
            }),
            Some(json!({ "rows": "{{http_node.response}}" })),
        );

        let resolved = resolve_node_inputs(
            &node,
            &workflow_data(),
            &HashMap::new(),
            &InMemoryCredentials::new(),
            "user-1",
            &RunLogger::new(),
        )
        .await
        .unwrap();

        // Untouched: still contains the {{item.name}} placeholder.
        assert_eq!(resolved.config["itemTemplate"]["label"], "{{item.name}}");
        assert_eq!(resolved.config["retry"]["attempts"], 3);
        assert_eq!(resolved.config["items"]["id"], 42);
    }

    #[tokio::test]
    async fn nested_config_objects_are_resolved() {
        let node = make_node(
            json!({
                "headers": { "x-user": "user {{name}}" },
                "body": [ { "tag": "{{name}}" } ]
            }),
            Some(json!({ "name": "'literal'" })),
        );

        let resolved = resolve_node_inputs(
            &node,
            &workflow_data(),
            &HashMap::new(),
            &InMemoryCredentials::new(),
            "user-1",
            &RunLogger::new(),
        )
        .await
        .unwrap();

        assert_eq!(resolved.config["headers"]["x-user"], "user 'literal'");
        assert_eq!(resolved.config["body"][0]["tag"], "'literal'");
    }

    #[tokio::test]
    async fn unresolved_mapping_fails_the_node() {
        let node = make_node(
            json!({}),
            Some(json!({ "x": "{{missing_node.value}}" })),
        );

        let err = resolve_node_inputs(
            &node,
            &workflow_data(),
            &HashMap::new(),
            &InMemoryCredentials::new(),
            "user-1",
            &RunLogger::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResolveError::Unresolved { .. }));
    }
}
