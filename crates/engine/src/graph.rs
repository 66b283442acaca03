//! Graph validation and the adjacency structure driving the scheduler.
//!
//! Rules enforced before any node executes:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every connection must reference valid node IDs on both ends.
//! 3. Every node's `type` must resolve to a registered handler.
//! 4. The data-flow graph (error-handle edges excluded) must be acyclic.
//!
//! Error-handle edges are segregated into their own routing table. They
//! participate in readiness (a target waits for its error source to reach
//! a terminal status) only while that keeps the readiness graph acyclic:
//! an error edge pointing back into the failing node's own ancestry stays
//! in the routing table but cannot delay a node that must run first.

use std::collections::{HashMap, HashSet, VecDeque};

use nodes::NodeRegistry;

use crate::error::EngineError;
use crate::models::{Connection, Workflow};

/// Validated adjacency structure for one workflow.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    /// Incoming data connections per node (error handles excluded).
    data_predecessors: HashMap<String, Vec<Connection>>,
    /// Error routing table: failing node → nodes wired to its error handle.
    error_routes: HashMap<String, Vec<String>>,
    /// Reverse of `error_routes`: node → failing nodes it handles.
    error_sources: HashMap<String, Vec<String>>,
    /// Outgoing neighbours per node in the readiness graph (deduplicated).
    successors: HashMap<String, Vec<String>>,
    /// Count of distinct readiness predecessors per node.
    predecessor_counts: HashMap<String, usize>,
    /// Node IDs in definition order (the deterministic seed order).
    node_order: Vec<String>,
}

impl ExecutionGraph {
    pub fn data_predecessors(&self, node_id: &str) -> &[Connection] {
        self.data_predecessors
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Nodes wired to `node_id`'s error handle.
    pub fn error_targets(&self, node_id: &str) -> &[String] {
        self.error_routes
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Failing nodes whose error handle is wired into `node_id`.
    pub fn error_sources(&self, node_id: &str) -> &[String] {
        self.error_sources
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `source` routes its failure to `target` via an error handle.
    pub fn has_error_route(&self, source: &str, target: &str) -> bool {
        self.error_targets(source).iter().any(|t| t == target)
    }

    pub fn successors(&self, node_id: &str) -> &[String] {
        self.successors
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn predecessor_count(&self, node_id: &str) -> usize {
        self.predecessor_counts.get(node_id).copied().unwrap_or(0)
    }

    /// Node IDs with no readiness predecessors, in definition order — the
    /// initial ready set.
    pub fn roots(&self) -> Vec<String> {
        self.node_order
            .iter()
            .filter(|id| self.predecessor_count(id) == 0)
            .cloned()
            .collect()
    }

    pub fn node_order(&self) -> &[String] {
        &self.node_order
    }
}

/// Validate a workflow against the registry and build its adjacency
/// structure.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if a connection endpoint is missing.
/// - [`EngineError::UnknownNodeType`] if a node's type has no handler.
/// - [`EngineError::CycleDetected`] if the data-flow graph has a cycle.
pub fn build_graph(
    workflow: &Workflow,
    registry: &NodeRegistry,
) -> Result<ExecutionGraph, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Unique node IDs, registered types.
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
        if !registry.contains(&node.node_type) {
            return Err(EngineError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    // -----------------------------------------------------------------------
    // 2. Connection endpoints must exist.
    // -----------------------------------------------------------------------
    for conn in &workflow.connections {
        if !node_set.contains(conn.source_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: conn.source_node_id.clone(),
                side: "source",
            });
        }
        if !node_set.contains(conn.target_node_id.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: conn.target_node_id.clone(),
                side: "target",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Cycle detection over data edges (Kahn's algorithm).
    // -----------------------------------------------------------------------
    let mut in_degree: HashMap<&str, usize> = workflow
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0))
        .collect();
    let mut data_adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for conn in &workflow.connections {
        if conn.is_error_handle() {
            continue;
        }
        data_adjacency
            .entry(conn.source_node_id.as_str())
            .or_default()
            .push(conn.target_node_id.as_str());
        *in_degree.entry(conn.target_node_id.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited = 0usize;

    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        if let Some(neighbours) = data_adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    if visited != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    // -----------------------------------------------------------------------
    // 4. Build adjacency. Data edges always enter the readiness graph;
    //    error edges enter it only while the readiness graph stays acyclic
    //    (a backward error edge keeps its routing entry but cannot delay a
    //    node that must run before its handler's failure can exist).
    // -----------------------------------------------------------------------
    let mut data_predecessors: HashMap<String, Vec<Connection>> = HashMap::new();
    let mut error_routes: HashMap<String, Vec<String>> = HashMap::new();
    let mut error_sources: HashMap<String, Vec<String>> = HashMap::new();
    let mut ready_adjacency: HashMap<String, HashSet<String>> = HashMap::new();
    let mut ready_predecessors: HashMap<String, HashSet<String>> = HashMap::new();

    for node in &workflow.nodes {
        data_predecessors.entry(node.id.clone()).or_default();
        ready_adjacency.entry(node.id.clone()).or_default();
        ready_predecessors.entry(node.id.clone()).or_default();
    }

    for conn in &workflow.connections {
        if conn.is_error_handle() {
            let targets = error_routes.entry(conn.source_node_id.clone()).or_default();
            if !targets.contains(&conn.target_node_id) {
                targets.push(conn.target_node_id.clone());
            }
            let sources = error_sources.entry(conn.target_node_id.clone()).or_default();
            if !sources.contains(&conn.source_node_id) {
                sources.push(conn.source_node_id.clone());
            }

            if reachable(&ready_adjacency, &conn.target_node_id, &conn.source_node_id) {
                tracing::debug!(
                    "error edge {} -> {} would cycle the readiness graph; kept as routing only",
                    conn.source_node_id,
                    conn.target_node_id
                );
                continue;
            }
        } else {
            data_predecessors
                .entry(conn.target_node_id.clone())
                .or_default()
                .push(conn.clone());
        }

        ready_adjacency
            .entry(conn.source_node_id.clone())
            .or_default()
            .insert(conn.target_node_id.clone());
        ready_predecessors
            .entry(conn.target_node_id.clone())
            .or_default()
            .insert(conn.source_node_id.clone());
    }

    let successors: HashMap<String, Vec<String>> = ready_adjacency
        .iter()
        .map(|(id, targets)| {
            // Deterministic decrement order.
            let mut targets: Vec<String> = targets.iter().cloned().collect();
            targets.sort_unstable();
            (id.clone(), targets)
        })
        .collect();
    let predecessor_counts: HashMap<String, usize> = ready_predecessors
        .iter()
        .map(|(id, preds)| (id.clone(), preds.len()))
        .collect();

    Ok(ExecutionGraph {
        data_predecessors,
        error_routes,
        error_sources,
        successors,
        predecessor_counts,
        node_order: workflow.nodes.iter().map(|n| n.id.clone()).collect(),
    })
}

/// Whether `to` is reachable from `from` in the given adjacency map.
fn reachable(
    adjacency: &HashMap<String, HashSet<String>>,
    from: &str,
    to: &str,
) -> bool {
    if from == to {
        return true;
    }
    let mut stack = vec![from];
    let mut seen: HashSet<&str> = HashSet::new();
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = adjacency.get(current) {
            for neighbour in next {
                if neighbour == to {
                    return true;
                }
                stack.push(neighbour.as_str());
            }
        }
    }
    false
}
