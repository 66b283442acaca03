//! Placeholder resolver — `{{scope.path}}` expressions in node config.
//!
//! Expressions are parsed into a small AST (scope + path segments + byte
//! offset) rather than substituted in place by regex, so errors carry a
//! precise location and a config value that is a single expression keeps
//! the referenced value's type.
//!
//! Resolution scopes, checked in order:
//! 1. local bindings produced by the node's `inputMapping`
//! 2. `credential.<Name>` — the external credential store, scoped to the
//!    executing user, with an environment-variable fallback
//! 3. `env.<NAME>` — the process environment snapshot
//! 4. a prior node's recorded output (`<nodeId>.<path>`)
//!
//! An unresolvable reference is an error attributed to the consuming node —
//! never a silent empty substitution.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use nodes::RunLogger;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a [`CredentialStore`] backend (as opposed to a
/// credential simply not existing).
#[derive(Debug, Error, Clone)]
#[error("credential store failure: {0}")]
pub struct CredentialStoreError(pub String);

/// Errors produced while parsing or resolving placeholder expressions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("empty placeholder at byte {offset}")]
    Empty { offset: usize },

    #[error("malformed placeholder '{raw}' at byte {offset}")]
    Malformed { raw: String, offset: usize },

    #[error("unresolved reference '{{{{{raw}}}}}'")]
    Unresolved { raw: String },

    #[error(
        "cross-node reference '{{{{{raw}}}}}' is not allowed inside config; \
         bind it to a local name via inputMapping"
    )]
    CrossNodeInConfig { raw: String },

    #[error("credential '{name}' not found in credential store or environment")]
    CredentialNotFound { name: String },

    #[error("environment variable '{name}' not found")]
    EnvNotFound { name: String },

    #[error("credential store failure: {0}")]
    CredentialBackend(String),
}

impl From<CredentialStoreError> for ResolveError {
    fn from(e: CredentialStoreError) -> Self {
        Self::CredentialBackend(e.0)
    }
}

// ---------------------------------------------------------------------------
// Credential store boundary
// ---------------------------------------------------------------------------

/// Collaborator boundary consulted only by the resolver: looks up a secret
/// by user-friendly name, scoped to the executing user.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential_value(
        &self,
        name: &str,
        user_id: &str,
    ) -> Result<Option<String>, CredentialStoreError>;
}

/// In-memory credential store for tests and file-based CLI runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentials {
    by_user: HashMap<String, HashMap<String, String>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        user_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.by_user
            .entry(user_id.into())
            .or_default()
            .insert(name.into(), value.into());
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn get_credential_value(
        &self,
        name: &str,
        user_id: &str,
    ) -> Result<Option<String>, CredentialStoreError> {
        Ok(self
            .by_user
            .get(user_id)
            .and_then(|creds| creds.get(name))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// One parsed `{{...}}` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// The trimmed text between the braces, e.g. `http_node.response.id`.
    pub raw: String,
    /// Dot-separated path segments.
    pub segments: Vec<String>,
    /// Byte offset of the opening `{{` within the template string.
    pub offset: usize,
}

/// A template string decomposed into literal runs and expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Expr(Expression),
}

/// Parse a string into template parts.
///
/// # Errors
/// Unterminated, empty, or malformed placeholders (whitespace or nested
/// braces inside the expression, empty path segments).
pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, ResolveError> {
    let mut parts = Vec::new();
    let mut rest = input;
    let mut consumed = 0usize;

    while let Some(start) = rest.find("{{") {
        let offset = consumed + start;
        let Some(end_rel) = rest[start + 2..].find("}}") else {
            return Err(ResolveError::Unterminated { offset });
        };
        let end = start + 2 + end_rel;

        if start > 0 {
            parts.push(TemplatePart::Literal(rest[..start].to_string()));
        }

        let raw = rest[start + 2..end].trim().to_string();
        if raw.is_empty() {
            return Err(ResolveError::Empty { offset });
        }
        if raw.contains(|c: char| c.is_whitespace() || c == '{' || c == '}') {
            return Err(ResolveError::Malformed { raw, offset });
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ResolveError::Malformed { raw, offset });
        }

        parts.push(TemplatePart::Expr(Expression {
            raw,
            segments,
            offset,
        }));

        consumed += end + 2;
        rest = &rest[end + 2..];
    }

    if !rest.is_empty() {
        parts.push(TemplatePart::Literal(rest.to_string()));
    }

    Ok(parts)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Whether expressions may reach into other nodes' outputs. Allowed for
/// `inputMapping` values; denied inside `config`, where cross-node data
/// must come in through a local binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossNodePolicy {
    Allow,
    Deny,
}

/// Everything an expression can resolve against.
pub struct ResolverContext<'a> {
    /// Accumulated node entries (`nodeId` → recorded output object).
    pub workflow_data: &'a Map<String, Value>,
    /// Local bindings produced by `inputMapping` (plus handler-specific
    /// extras such as error details on the error path).
    pub locals: &'a Map<String, Value>,
    /// Process configuration snapshot.
    pub env: &'a HashMap<String, String>,
    pub credentials: &'a dyn CredentialStore,
    pub user_id: &'a str,
    pub cross_node: CrossNodePolicy,
    pub logger: &'a RunLogger,
}

/// Resolve a raw config value. Non-strings pass through untouched; a string
/// that is exactly one expression returns the referenced value with its
/// type intact; a string with embedded expressions returns a string with
/// substitutions applied (objects embed as JSON, null as the empty string).
pub async fn resolve_value(raw: &Value, cx: &ResolverContext<'_>) -> Result<Value, ResolveError> {
    let Value::String(template) = raw else {
        return Ok(raw.clone());
    };

    let parts = parse_template(template)?;

    // Fast path: no placeholders at all.
    if parts.iter().all(|p| matches!(p, TemplatePart::Literal(_))) {
        return Ok(raw.clone());
    }

    // Pure expression: preserve the underlying type.
    if let [TemplatePart::Expr(expr)] = parts.as_slice() {
        return resolve_expression(expr, cx).await;
    }

    let mut out = String::new();
    for part in &parts {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Expr(expr) => {
                let value = resolve_expression(expr, cx).await?;
                out.push_str(&embed(&value));
            }
        }
    }
    Ok(Value::String(out))
}

async fn resolve_expression(
    expr: &Expression,
    cx: &ResolverContext<'_>,
) -> Result<Value, ResolveError> {
    let first = expr.segments[0].as_str();

    // 1. Local bindings shadow every other scope.
    if let Some(root) = cx.locals.get(first) {
        return walk_path(root, &expr.segments[1..], &expr.raw);
    }

    // 2. Credential store (with env fallback, as a development convenience).
    if first == "credential" && expr.segments.len() >= 2 {
        let name = expr.segments[1..].join(".");
        if let Some(secret) = cx
            .credentials
            .get_credential_value(&name, cx.user_id)
            .await?
        {
            return Ok(Value::String(secret));
        }
        for candidate in [
            name.clone(),
            format!("{name}_API_KEY"),
            format!("{name}_SECRET"),
            format!("{name}_TOKEN"),
        ] {
            if let Some(value) = cx.env.get(&candidate) {
                cx.logger.info(format!(
                    "Credential '{name}' resolved from environment variable as a fallback."
                ));
                return Ok(Value::String(value.clone()));
            }
        }
        return Err(ResolveError::CredentialNotFound { name });
    }

    // 3. Process environment.
    if first == "env" && expr.segments.len() >= 2 {
        let name = expr.segments[1..].join(".");
        return match cx.env.get(&name) {
            Some(value) => Ok(Value::String(value.clone())),
            None => Err(ResolveError::EnvNotFound { name }),
        };
    }

    // 4. Prior node outputs.
    if let Some(root) = cx.workflow_data.get(first) {
        if cx.cross_node == CrossNodePolicy::Deny {
            return Err(ResolveError::CrossNodeInConfig {
                raw: expr.raw.clone(),
            });
        }
        return walk_path(root, &expr.segments[1..], &expr.raw);
    }

    Err(ResolveError::Unresolved {
        raw: expr.raw.clone(),
    })
}

fn walk_path(root: &Value, path: &[String], raw: &str) -> Result<Value, ResolveError> {
    let mut current = root;
    for part in path {
        let next = match current {
            Value::Object(map) => map.get(part.as_str()),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| ResolveError::Unresolved {
            raw: raw.to_string(),
        })?;
    }
    Ok(current.clone())
}

fn embed(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(v).unwrap_or_default(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    struct Fixture {
        workflow_data: Map<String, Value>,
        locals: Map<String, Value>,
        env: HashMap<String, String>,
        credentials: InMemoryCredentials,
        logger: RunLogger,
    }

    impl Fixture {
        fn new() -> Self {
            let mut credentials = InMemoryCredentials::new();
            credentials.insert("user-1", "SlackBotToken", "xoxb-secret");

            let mut env = HashMap::new();
            env.insert("REGION".to_string(), "eu-west-1".to_string());
            env.insert("FALLBACK_TOKEN".to_string(), "from-env".to_string());

            Self {
                workflow_data: obj(json!({
                    "http_node": {
                        "response": { "id": 42, "tags": ["a", "b"] },
                        "status_code": 200,
                        "lastExecutionStatus": "success"
                    }
                })),
                locals: obj(json!({ "userId": 7, "label": "widget" })),
                env,
                credentials,
                logger: RunLogger::new(),
            }
        }

        fn cx(&self, cross_node: CrossNodePolicy) -> ResolverContext<'_> {
            ResolverContext {
                workflow_data: &self.workflow_data,
                locals: &self.locals,
                env: &self.env,
                credentials: &self.credentials,
                user_id: "user-1",
                cross_node,
                logger: &self.logger,
            }
        }
    }

    #[test]
    fn parse_splits_literals_and_expressions() {
        let parts = parse_template("id={{http_node.response.id}}, tag {{label}}").unwrap();
        assert_eq!(parts.len(), 4);
        assert!(matches!(&parts[0], TemplatePart::Literal(l) if l == "id="));
        assert!(matches!(&parts[1], TemplatePart::Expr(e) if e.segments.len() == 3));
    }

    #[test]
    fn parse_rejects_unterminated_and_empty() {
        assert_eq!(
            parse_template("x {{oops"),
            Err(ResolveError::Unterminated { offset: 2 })
        );
        assert_eq!(
            parse_template("{{ }}"),
            Err(ResolveError::Empty { offset: 0 })
        );
        assert!(matches!(
            parse_template("{{a b}}"),
            Err(ResolveError::Malformed { .. })
        ));
        assert!(matches!(
            parse_template("{{a..b}}"),
            Err(ResolveError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn pure_expression_keeps_type() {
        let f = Fixture::new();
        let out = resolve_value(
            &json!("{{http_node.response.id}}"),
            &f.cx(CrossNodePolicy::Allow),
        )
        .await
        .unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn embedded_expression_stringifies() {
        let f = Fixture::new();
        let out = resolve_value(
            &json!("id is {{http_node.response.id}} ({{label}})"),
            &f.cx(CrossNodePolicy::Allow),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("id is 42 (widget)"));
    }

    #[tokio::test]
    async fn objects_embed_as_json() {
        let f = Fixture::new();
        let out = resolve_value(
            &json!("tags: {{http_node.response.tags}}"),
            &f.cx(CrossNodePolicy::Allow),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("tags: [\"a\",\"b\"]"));
    }

    #[tokio::test]
    async fn array_index_path() {
        let f = Fixture::new();
        let out = resolve_value(
            &json!("{{http_node.response.tags.1}}"),
            &f.cx(CrossNodePolicy::Allow),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("b"));
    }

    #[tokio::test]
    async fn credential_scope_resolves_from_store() {
        let f = Fixture::new();
        let out = resolve_value(
            &json!("{{credential.SlackBotToken}}"),
            &f.cx(CrossNodePolicy::Deny),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("xoxb-secret"));
    }

    #[tokio::test]
    async fn credential_falls_back_to_env() {
        let f = Fixture::new();
        let out = resolve_value(
            &json!("{{credential.FALLBACK_TOKEN}}"),
            &f.cx(CrossNodePolicy::Deny),
        )
        .await
        .unwrap();
        assert_eq!(out, json!("from-env"));
        assert!(f
            .logger
            .snapshot()
            .iter()
            .any(|l| l.message.contains("fallback")));
    }

    #[tokio::test]
    async fn missing_credential_is_an_error() {
        let f = Fixture::new();
        let err = resolve_value(
            &json!("{{credential.Nope}}"),
            &f.cx(CrossNodePolicy::Allow),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::CredentialNotFound { name } if name == "Nope"));
    }

    #[tokio::test]
    async fn env_scope_and_missing_env() {
        let f = Fixture::new();
        let out = resolve_value(&json!("{{env.REGION}}"), &f.cx(CrossNodePolicy::Deny))
            .await
            .unwrap();
        assert_eq!(out, json!("eu-west-1"));

        let err = resolve_value(&json!("{{env.MISSING}}"), &f.cx(CrossNodePolicy::Deny))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::EnvNotFound { .. }));
    }

    #[tokio::test]
    async fn locals_shadow_node_outputs() {
        let mut f = Fixture::new();
        f.locals = obj(json!({ "http_node": { "response": { "id": 1 } } }));
        let out = resolve_value(
            &json!("{{http_node.response.id}}"),
            &f.cx(CrossNodePolicy::Deny),
        )
        .await
        .unwrap();
        assert_eq!(out, json!(1));
    }

    #[tokio::test]
    async fn cross_node_denied_in_config() {
        let f = Fixture::new();
        let err = resolve_value(
            &json!("{{http_node.response.id}}"),
            &f.cx(CrossNodePolicy::Deny),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::CrossNodeInConfig { .. }));
    }

    #[tokio::test]
    async fn unresolved_reference_is_an_error_not_empty() {
        let f = Fixture::new();
        let err = resolve_value(
            &json!("value: {{ghost_node.output}}"),
            &f.cx(CrossNodePolicy::Allow),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::Unresolved { raw } if raw == "ghost_node.output"));
    }

    #[tokio::test]
    async fn missing_sub_path_is_an_error() {
        let f = Fixture::new();
        let err = resolve_value(
            &json!("{{http_node.response.missing}}"),
            &f.cx(CrossNodePolicy::Allow),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::Unresolved { .. }));
    }

    #[tokio::test]
    async fn non_strings_pass_through() {
        let f = Fixture::new();
        let out = resolve_value(&json!(17), &f.cx(CrossNodePolicy::Deny))
            .await
            .unwrap();
        assert_eq!(out, json!(17));
    }
}
