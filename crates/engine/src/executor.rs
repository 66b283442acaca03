//! Workflow execution engine.
//!
//! `Engine` is the central orchestrator:
//! 1. Validates the graph and builds the adjacency structure.
//! 2. Drives a ready-set loop: every node whose predecessors are all
//!    terminal is dispatched, concurrently, onto a bounded worker pool.
//! 3. Resolves each node's inputs and run condition strictly before
//!    dispatch, so handlers only ever observe terminal upstream outputs.
//! 4. Wraps each handler in the node's retry policy and a per-attempt
//!    timeout.
//! 5. Routes failures to error-handle-connected nodes; skips ordinary
//!    descendants of failed or skipped nodes.
//! 6. Aggregates the final report once the ready set drains.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use nodes::{ExecutionMode, HandlerContext, NodeError, NodeHandler, NodeRegistry, RunLogger};

use crate::condition::{evaluate_condition, RUN_CONDITION_KEY};
use crate::error::{EngineError, NodeFailure};
use crate::graph::{build_graph, ExecutionGraph};
use crate::mapper::resolve_node_inputs;
use crate::models::{Node, NodeStatus, RetryPolicy, Workflow};
use crate::report::{build_report, ExecutionReport};
use crate::template::CredentialStore;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently executing nodes per run.
    pub max_concurrent_nodes: usize,
    /// Per-attempt timeout when a node does not set `timeoutMs`.
    pub default_node_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 8,
            default_node_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless orchestrator that runs a single workflow execution per call.
///
/// Constructed from injected parts (handler registry, credential store,
/// environment snapshot) so concurrent runs and tests are fully isolated
/// from each other.
pub struct Engine {
    registry: Arc<NodeRegistry>,
    credentials: Arc<dyn CredentialStore>,
    env: HashMap<String, String>,
    config: ExecutorConfig,
}

impl Engine {
    /// Create a new engine with the process environment as the `env` scope.
    pub fn new(
        registry: Arc<NodeRegistry>,
        credentials: Arc<dyn CredentialStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            credentials,
            env: std::env::vars().collect(),
            config,
        }
    }

    /// Replace the environment snapshot (test and embedding hook).
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Run the workflow to completion and return the aggregated report.
    ///
    /// Node-scoped failures are contained in the report; only structural
    /// problems (cycles, unknown types or references, duplicate IDs)
    /// return `Err`.
    ///
    /// # Errors
    /// Returns `EngineError` if graph validation fails.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        mode: ExecutionMode,
        user_id: &str,
        initial_data: Option<HashMap<String, Value>>,
    ) -> Result<ExecutionReport, EngineError> {
        self.execute_with_cancellation(
            workflow,
            mode,
            user_id,
            initial_data,
            CancellationToken::new(),
        )
        .await
    }

    /// As [`Engine::execute`], with a cancellation token. Cancelling
    /// prevents scheduling of not-yet-started nodes and best-effort aborts
    /// in-flight handlers; already-recorded entries are retained for
    /// partial reporting.
    #[instrument(skip_all, fields(mode = %mode, user = %user_id))]
    pub async fn execute_with_cancellation(
        &self,
        workflow: &Workflow,
        mode: ExecutionMode,
        user_id: &str,
        initial_data: Option<HashMap<String, Value>>,
        cancel: CancellationToken,
    ) -> Result<ExecutionReport, EngineError> {
        let graph = build_graph(workflow, &self.registry)?;
        let node_map: HashMap<&str, &Node> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let logger = RunLogger::new();
        logger.info(format!(
            "Starting execution of {} node(s) in {} mode for user {user_id}.",
            workflow.nodes.len(),
            mode.to_string().to_uppercase(),
        ));

        // Seeds bypass their node's handler; unknown keys are dropped.
        let mut seeds: HashMap<String, Value> = HashMap::new();
        for (node_id, value) in initial_data.unwrap_or_default() {
            if node_map.contains_key(node_id.as_str()) {
                seeds.insert(node_id, value);
            } else {
                logger.info(format!(
                    "Ignoring initialData for unknown node '{node_id}'."
                ));
            }
        }

        let mut workflow_data: Map<String, Value> = Map::new();
        let mut statuses: HashMap<String, NodeStatus> = HashMap::new();
        let mut remaining: HashMap<String, usize> = graph
            .node_order()
            .iter()
            .map(|id| (id.clone(), graph.predecessor_count(id)))
            .collect();

        // Initial ready set: zero-predecessor nodes plus seeded nodes.
        let mut ready: VecDeque<String> = graph.roots().into();
        for node_id in graph.node_order() {
            if seeds.contains_key(node_id) && !ready.contains(node_id) {
                ready.push_back(node_id.clone());
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_nodes.max(1)));
        let mut running: JoinSet<NodeCompletion> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut pending_bindings: HashMap<String, Map<String, Value>> = HashMap::new();
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() && !cancelled {
                cancelled = true;
                logger.error("Run cancelled; stopping scheduling and aborting in-flight nodes.");
                running.abort_all();
            }

            // -------------------------------------------------------------
            // Dispatch phase: consume everything currently ready. A
            // cancelled run stops scheduling; in-flight completions are
            // still drained below.
            // -------------------------------------------------------------
            if cancelled {
                ready.clear();
            }
            while let Some(node_id) = ready.pop_front() {
                if statuses.contains_key(&node_id) || dispatched.contains(&node_id) {
                    continue;
                }
                let node = node_map[node_id.as_str()];

                // initialData seeding: record the supplied output verbatim.
                if let Some(seed) = seeds.remove(&node_id) {
                    logger.info(format!(
                        "Node {} seeded from initialData; handler bypassed.",
                        node.identifier()
                    ));
                    let entry = seeded_entry(seed);
                    workflow_data.insert(node_id.clone(), entry);
                    mark_complete(&graph, &node_id, NodeStatus::Success, &mut statuses, &mut remaining, &mut ready);
                    continue;
                }

                // Skip cascade and error-path eligibility.
                if let Some(reason) = skip_reason(&graph, &statuses, &node_id) {
                    logger.info(format!("Skipping node {}: {reason}.", node.identifier()));
                    workflow_data.insert(node_id.clone(), skipped_entry(&reason));
                    mark_complete(&graph, &node_id, NodeStatus::Skipped, &mut statuses, &mut remaining, &mut ready);
                    continue;
                }

                // Inputs are fully resolved before dispatch.
                let resolved = match resolve_node_inputs(
                    node,
                    &workflow_data,
                    &self.env,
                    self.credentials.as_ref(),
                    user_id,
                    &logger,
                )
                .await
                {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        self.record_failure(
                            &graph,
                            node,
                            NodeFailure::Placeholder(e),
                            None,
                            &logger,
                            &mut workflow_data,
                            &mut statuses,
                            &mut remaining,
                            &mut ready,
                        );
                        continue;
                    }
                };

                // Run condition gates dispatch, after inputs are mapped.
                if let Some(condition) = resolved.config.get(RUN_CONDITION_KEY) {
                    match evaluate_condition(condition) {
                        Ok(true) => {}
                        Ok(false) => {
                            let reason = "run condition evaluated to false";
                            logger.info(format!(
                                "Skipping node {}: {reason}.",
                                node.identifier()
                            ));
                            workflow_data.insert(node_id.clone(), skipped_entry(reason));
                            mark_complete(&graph, &node_id, NodeStatus::Skipped, &mut statuses, &mut remaining, &mut ready);
                            continue;
                        }
                        Err(e) => {
                            self.record_failure(
                                &graph,
                                node,
                                NodeFailure::Condition(e.to_string()),
                                Some(resolved.bindings),
                                &logger,
                                &mut workflow_data,
                                &mut statuses,
                                &mut remaining,
                                &mut ready,
                            );
                            continue;
                        }
                    }
                }

                // Retry policy and timeout come from the resolved config.
                let retry: RetryPolicy = match resolved.config.get("retry") {
                    Some(raw) => match serde_json::from_value(raw.clone()) {
                        Ok(policy) => policy,
                        Err(e) => {
                            self.record_failure(
                                &graph,
                                node,
                                NodeFailure::Handler(format!("invalid retry policy: {e}")),
                                Some(resolved.bindings),
                                &logger,
                                &mut workflow_data,
                                &mut statuses,
                                &mut remaining,
                                &mut ready,
                            );
                            continue;
                        }
                    },
                    None => RetryPolicy::default(),
                };
                let timeout = resolved
                    .config
                    .get("timeoutMs")
                    .and_then(Value::as_u64)
                    .map(Duration::from_millis)
                    .unwrap_or(self.config.default_node_timeout);

                let handler = self
                    .registry
                    .get(&node.node_type)
                    .expect("node type validated by build_graph");

                dispatched.insert(node_id.clone());
                pending_bindings.insert(node_id.clone(), resolved.bindings.clone());

                let task = NodeTask {
                    handler,
                    config: Value::Object(resolved.config),
                    ctx: HandlerContext {
                        node_id: node_id.clone(),
                        node_name: node.name.clone(),
                        mode,
                        user_id: user_id.to_string(),
                        logger: logger.clone(),
                    },
                    identifier: node.identifier(),
                    retry,
                    timeout,
                    semaphore: Arc::clone(&semaphore),
                    cancel: cancel.clone(),
                };
                let abort_handle = running.spawn(task.run());
                in_flight.insert(abort_handle.id(), node_id);
            }

            // -------------------------------------------------------------
            // Completion phase.
            // -------------------------------------------------------------
            if running.is_empty() {
                if ready.is_empty() {
                    break;
                }
                continue;
            }

            match running.join_next_with_id().await {
                Some(Ok((task_id, completion))) => {
                    in_flight.remove(&task_id);
                    let node = node_map[completion.node_id.as_str()];
                    let bindings = pending_bindings
                        .remove(&completion.node_id)
                        .unwrap_or_default();
                    match completion.result {
                        Ok(output) => {
                            logger.success(format!(
                                "Node {} completed successfully.",
                                node.identifier()
                            ));
                            workflow_data.insert(
                                completion.node_id.clone(),
                                success_entry(output, bindings),
                            );
                            mark_complete(&graph, &completion.node_id, NodeStatus::Success, &mut statuses, &mut remaining, &mut ready);
                        }
                        Err(failure) => {
                            self.record_failure(
                                &graph,
                                node,
                                failure,
                                Some(bindings),
                                &logger,
                                &mut workflow_data,
                                &mut statuses,
                                &mut remaining,
                                &mut ready,
                            );
                        }
                    }
                }
                Some(Err(join_err)) => {
                    // A panicked or aborted handler task. Attribute it via
                    // the in-flight map so the node still reaches a
                    // terminal status.
                    if let Some(node_id) = in_flight.remove(&join_err.id()) {
                        let node = node_map[node_id.as_str()];
                        let bindings = pending_bindings.remove(&node_id);
                        let failure = if join_err.is_cancelled() {
                            NodeFailure::Cancelled
                        } else {
                            NodeFailure::Handler("handler task panicked".into())
                        };
                        self.record_failure(
                            &graph,
                            node,
                            failure,
                            bindings,
                            &logger,
                            &mut workflow_data,
                            &mut statuses,
                            &mut remaining,
                            &mut ready,
                        );
                    }
                }
                None => {}
            }
        }

        let report = build_report(workflow_data, logger.drain(), cancelled);
        tracing::info!("run finished with status {}", report.status);
        Ok(report)
    }

    /// Record a node-scoped failure and walk its error routes.
    #[allow(clippy::too_many_arguments)]
    fn record_failure(
        &self,
        graph: &ExecutionGraph,
        node: &Node,
        failure: NodeFailure,
        bindings: Option<Map<String, Value>>,
        logger: &RunLogger,
        workflow_data: &mut Map<String, Value>,
        statuses: &mut HashMap<String, NodeStatus>,
        remaining: &mut HashMap<String, usize>,
        ready: &mut VecDeque<String>,
    ) {
        let message = failure.to_string();
        logger.error(format!(
            "Node {} FAILED permanently: {message}",
            node.identifier()
        ));
        workflow_data.insert(node.id.clone(), error_entry(&message, bindings));

        let targets = graph.error_targets(&node.id);
        if !targets.is_empty() {
            logger.info(format!(
                "Routing failure of {} to error handler(s): {}.",
                node.identifier(),
                targets.join(", ")
            ));
            for target in targets {
                if statuses.contains_key(target) {
                    logger.info(format!(
                        "Error handler '{target}' already reached a terminal status; \
                         it cannot run again."
                    ));
                }
            }
        }

        mark_complete(graph, &node.id, NodeStatus::Error, statuses, remaining, ready);
    }
}

// ---------------------------------------------------------------------------
// Per-node task: retry loop + timeout + cancellation
// ---------------------------------------------------------------------------

struct NodeCompletion {
    node_id: String,
    result: Result<Value, NodeFailure>,
}

struct NodeTask {
    handler: Arc<dyn NodeHandler>,
    config: Value,
    ctx: HandlerContext,
    identifier: String,
    retry: RetryPolicy,
    timeout: Duration,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl NodeTask {
    async fn run(self) -> NodeCompletion {
        let node_id = self.ctx.node_id.clone();
        let result = self.attempt_all().await;
        NodeCompletion { node_id, result }
    }

    async fn attempt_all(self) -> Result<Value, NodeFailure> {
        let _permit = match self.semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(NodeFailure::Cancelled),
        };

        // Retries are suppressed in simulation: canned outputs either work
        // on the first attempt or never will.
        let attempts = if self.ctx.mode.is_simulation() {
            1
        } else {
            self.retry.attempts.max(1)
        };

        for attempt in 1..=attempts {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(NodeFailure::Cancelled),
                result = tokio::time::timeout(
                    self.timeout,
                    self.handler.execute(&self.config, &self.ctx),
                ) => match result {
                    Ok(handler_result) => handler_result,
                    Err(_elapsed) => Err(NodeError::Retryable(format!(
                        "execution timed out after {:?}",
                        self.timeout
                    ))),
                },
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        self.ctx.logger.info(format!(
                            "Node {} succeeded on attempt {attempt}/{attempts}.",
                            self.identifier
                        ));
                    }
                    return Ok(value);
                }
                Err(NodeError::Fatal(message)) => return Err(NodeFailure::Handler(message)),
                Err(NodeError::Retryable(message)) => {
                    if attempt == attempts {
                        if message.starts_with("execution timed out") {
                            return Err(NodeFailure::Timeout(self.timeout));
                        }
                        return Err(NodeFailure::Handler(message));
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    self.ctx.logger.info(format!(
                        "Node {} failed on attempt {attempt}/{attempts}, retrying in {delay:?}: {message}",
                        self.identifier
                    ));
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = self.cancel.cancelled() => return Err(NodeFailure::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        unreachable!("the final attempt always returns")
    }
}

// ---------------------------------------------------------------------------
// Readiness bookkeeping
// ---------------------------------------------------------------------------

/// Mark a node terminal and surface newly ready successors.
fn mark_complete(
    graph: &ExecutionGraph,
    node_id: &str,
    status: NodeStatus,
    statuses: &mut HashMap<String, NodeStatus>,
    remaining: &mut HashMap<String, usize>,
    ready: &mut VecDeque<String>,
) {
    if statuses.insert(node_id.to_string(), status).is_some() {
        return;
    }
    for successor in graph.successors(node_id) {
        if let Some(count) = remaining.get_mut(successor) {
            if *count > 0 {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(successor.clone());
                }
            }
        }
    }
}

/// Why a ready node must not run, if any reason exists.
///
/// - A data predecessor that was skipped skips this node.
/// - A data predecessor that failed skips this node unless that same
///   predecessor routes its error handle here.
/// - A node wired only to error handles runs iff at least one of its
///   sources actually failed.
fn skip_reason(
    graph: &ExecutionGraph,
    statuses: &HashMap<String, NodeStatus>,
    node_id: &str,
) -> Option<String> {
    let data_preds = graph.data_predecessors(node_id);
    let error_sources = graph.error_sources(node_id);

    if data_preds.is_empty() {
        if !error_sources.is_empty() {
            let any_failed = error_sources
                .iter()
                .any(|source| statuses.get(source) == Some(&NodeStatus::Error));
            if !any_failed {
                return Some("no upstream failure to handle".to_string());
            }
        }
        return None;
    }

    for conn in data_preds {
        let source = &conn.source_node_id;
        match statuses.get(source) {
            Some(NodeStatus::Success) => {}
            Some(NodeStatus::Skipped) => {
                return Some(format!("upstream node '{source}' was skipped"));
            }
            Some(NodeStatus::Error) => {
                if !graph.has_error_route(source, node_id) {
                    return Some(format!("upstream node '{source}' failed"));
                }
            }
            // A data predecessor is always terminal by the time its target
            // is ready; treat anything else as not runnable.
            None => return Some(format!("upstream node '{source}' did not complete")),
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Context entry shapes
// ---------------------------------------------------------------------------

fn success_entry(output: Value, bindings: Map<String, Value>) -> Value {
    let mut entry = match output {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("output".to_string(), other);
            map
        }
    };
    entry.insert(
        "lastExecutionStatus".to_string(),
        Value::String("success".into()),
    );
    entry.insert("input".to_string(), Value::Object(bindings));
    Value::Object(entry)
}

fn error_entry(message: &str, bindings: Option<Map<String, Value>>) -> Value {
    let mut entry = Map::new();
    entry.insert(
        "lastExecutionStatus".to_string(),
        Value::String("error".into()),
    );
    entry.insert(
        "error_message".to_string(),
        Value::String(message.to_string()),
    );
    entry.insert("error".to_string(), Value::String(message.to_string()));
    if let Some(bindings) = bindings {
        entry.insert("input".to_string(), Value::Object(bindings));
    }
    Value::Object(entry)
}

fn skipped_entry(reason: &str) -> Value {
    let mut entry = Map::new();
    entry.insert(
        "lastExecutionStatus".to_string(),
        Value::String("skipped".into()),
    );
    entry.insert("reason".to_string(), Value::String(reason.to_string()));
    Value::Object(entry)
}

fn seeded_entry(seed: Value) -> Value {
    let mut entry = match seed {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("output".to_string(), other);
            map
        }
    };
    entry.insert(
        "lastExecutionStatus".to_string(),
        Value::String("success".into()),
    );
    Value::Object(entry)
}
