//! Flow execution.
//!
//! [`FlowRunner`] owns the graph, the plan registry, and per-node results.
//! A run walks the topological order, builds each node's plan from its
//! inputs, and records success or failure as data; node failures never
//! abort the run, they just fail everything downstream. Structural problems
//! (cycles, dangling references) abort before any node executes.

use crate::config::{ExecutionMode, FlowSettings};
use crate::engine::plan::LazyPlan;
use crate::error::Result;
use crate::flow::content::{ContentStore, InMemoryContentStore};
use crate::flow::executors;
use crate::flow::graph::FlowGraph;
use crate::flow::id::NodeId;
use crate::flow::infer::{self, Inferred};
use crate::flow::node::{InputSlot, Node};
use crate::flow::registry::{PlanRegistry, Preview};
use crate::flow::settings::{NodeKind, NodeSettings};
use crate::types::Schema;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a node within a run.
///
/// Pending -> Running -> Success | Failure; any invalidating edit to the
/// node or an upstream node resets it to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not executed since the last invalidating change.
    Pending,
    Running,
    Success,
    Failure,
}

/// Outcome of one node in the latest run.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    pub success: bool,
    pub error: Option<String>,
    /// Exact structural schema of the node's plan, when it built.
    pub schema: Option<Schema>,
}

impl NodeResult {
    fn success(schema: Schema) -> Self {
        Self {
            success: true,
            error: None,
            schema: Some(schema),
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
            schema: None,
        }
    }
}

/// Tally of the latest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Owns a flow graph and executes it.
pub struct FlowRunner {
    graph: FlowGraph,
    registry: PlanRegistry,
    results: HashMap<NodeId, NodeResult>,
    states: HashMap<NodeId, NodeState>,
    content: Box<dyn ContentStore>,
    settings: FlowSettings,
}

impl Default for FlowRunner {
    fn default() -> Self {
        Self::new(FlowGraph::new(), FlowSettings::default())
    }
}

impl FlowRunner {
    pub fn new(graph: FlowGraph, settings: FlowSettings) -> Self {
        Self {
            graph,
            registry: PlanRegistry::new(),
            results: HashMap::new(),
            states: HashMap::new(),
            content: Box::new(InMemoryContentStore::new()),
            settings,
        }
    }

    pub fn with_content_store(mut self, content: Box<dyn ContentStore>) -> Self {
        self.content = content;
        self
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn node_result(&self, id: NodeId) -> Option<&NodeResult> {
        self.results.get(&id)
    }

    pub fn node_state(&self, id: NodeId) -> NodeState {
        self.states.get(&id).copied().unwrap_or(NodeState::Pending)
    }

    pub fn results(&self) -> &HashMap<NodeId, NodeResult> {
        &self.results
    }

    // ── Graph mutation with cache upkeep ──

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        self.graph.add_node(node)
    }

    pub fn add_node_of_kind(&mut self, id: NodeId, kind: NodeKind) -> Result<()> {
        self.graph.add_node_of_kind(id, kind)
    }

    pub fn add_edge(&mut self, source: NodeId, target: NodeId, slot: InputSlot) -> Result<()> {
        self.graph.add_edge(source, target, slot)?;
        self.invalidate_downstream(target);
        Ok(())
    }

    pub fn remove_edge(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        self.graph.remove_edge(source, target)?;
        self.invalidate_downstream(target);
        Ok(())
    }

    /// Replace a node's settings and invalidate it plus everything fed by it.
    pub fn update_settings(&mut self, id: NodeId, settings: NodeSettings) -> Result<()> {
        self.graph.update_settings(id, settings)?;
        self.invalidate_downstream(id);
        Ok(())
    }

    /// Remove a node entirely: graph entry, upstream references, plan,
    /// cached preview, attached content, and last result.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        self.invalidate_downstream(id);
        let removed = self.graph.remove_node(id)?;
        self.content.delete(id);
        Ok(removed)
    }

    /// Attach in-memory table content to a read node.
    pub fn attach_content(&mut self, id: NodeId, frame: crate::engine::frame::DataFrame) {
        self.content.set(id, frame);
        self.invalidate_downstream(id);
    }

    /// Drop plans, previews, and recorded results for a node and everything
    /// downstream of it; the affected nodes return to `Pending`.
    pub fn invalidate_downstream(&mut self, id: NodeId) {
        for node in self.graph.downstream_of(id) {
            self.registry.remove(node);
            self.results.remove(&node);
            self.states.remove(&node);
        }
    }

    // ── Execution ──

    /// Execute the whole flow in topological order. Node failures are
    /// recorded, not raised; only structural graph errors return `Err`.
    pub fn run(&mut self) -> Result<RunReport> {
        let order = self.graph.topological_order()?;
        self.results.clear();
        self.states.clear();
        let mut report = RunReport::default();
        info!(nodes = order.len(), "executing flow");
        for id in order {
            self.execute_one(id);
            report.executed += 1;
            let result = &self.results[&id];
            if result.success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            if self.settings.show_detailed_progress {
                let node = self.graph.node(id)?;
                match &result.error {
                    None => info!(node = %id, kind = %node.kind(), "node succeeded"),
                    Some(message) => warn!(node = %id, kind = %node.kind(), %message, "node failed"),
                }
            }
        }
        Ok(report)
    }

    /// Execute one node and its upstream closure, leaving other results
    /// untouched.
    pub fn execute_node(&mut self, id: NodeId) -> Result<&NodeResult> {
        let order = self.graph.topological_order()?;
        let needed = self.upstream_closure(id)?;
        for candidate in order {
            if needed.contains(&candidate) {
                self.execute_one(candidate);
            }
        }
        Ok(&self.results[&id])
    }

    fn upstream_closure(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut closure = vec![id];
        let mut cursor = 0;
        while cursor < closure.len() {
            let current = closure[cursor];
            cursor += 1;
            for input in self.graph.node(current)?.input_nodes() {
                if !closure.contains(&input) {
                    closure.push(input);
                }
            }
        }
        Ok(closure)
    }

    fn execute_one(&mut self, id: NodeId) {
        self.states.insert(id, NodeState::Running);
        let result = self.run_node(id);
        let state = if result.success {
            NodeState::Success
        } else {
            NodeState::Failure
        };
        self.states.insert(id, state);
        self.results.insert(id, result);
    }

    fn run_node(&mut self, id: NodeId) -> NodeResult {
        let node = match self.graph.node(id) {
            Ok(node) => node.clone(),
            Err(err) => return NodeResult::failure(err.to_string()),
        };
        debug!(node = %id, kind = %node.kind(), "executing node");

        let mut inputs: Vec<LazyPlan> = Vec::new();
        for (input, _) in node.declared_inputs() {
            match self.results.get(&input) {
                Some(result) if result.success => match self.registry.get_plan(input) {
                    Some(plan) => inputs.push(plan.clone()),
                    None => {
                        return NodeResult::failure(format!(
                            "{} node {id}: upstream node {input} has no plan",
                            node.kind()
                        ));
                    }
                },
                _ => {
                    return NodeResult::failure(format!(
                        "{} node {id}: upstream node {input} did not succeed",
                        node.kind()
                    ));
                }
            }
        }

        match executors::build_plan(&node, &inputs, self.content.as_ref()) {
            Ok(plan) => {
                let schema = plan.schema();
                self.registry.store_plan(id, plan);
                // Development mode materializes every node so previews are
                // instant; performance mode only materializes preview nodes.
                let warm = match self.settings.execution_mode {
                    ExecutionMode::Development => true,
                    ExecutionMode::Performance => node.kind() == NodeKind::Preview,
                };
                if warm {
                    let rows = self.registry.default_sample_rows();
                    if let Err(err) = self.registry.fetch_preview(id, rows, false) {
                        return NodeResult::failure(format!(
                            "{} node {id}: {err}",
                            node.kind()
                        ));
                    }
                }
                NodeResult::success(schema)
            }
            Err(err) => NodeResult::failure(format!("{} node {id}: {err}", node.kind())),
        }
    }

    // ── Introspection ──

    /// Preview of up to `max_rows` rows for a node, from the cache or by
    /// materializing its plan.
    pub fn fetch_preview(
        &mut self,
        id: NodeId,
        max_rows: usize,
        force_refresh: bool,
    ) -> Result<Arc<Preview>> {
        self.registry.fetch_preview(id, max_rows, force_refresh)
    }

    /// Structural schema recorded for a node by the last run.
    pub fn plan_schema(&self, id: NodeId) -> Option<&Schema> {
        self.registry.get_schema(id)
    }

    /// Inference over the current graph, falling back to the exact schema
    /// of a node's registered plan only where inference alone cannot know
    /// the columns. The fallback happens during the walk, so a data-blind
    /// source upgraded from its plan still feeds fresh inference of every
    /// node downstream of it.
    pub fn inferred_schemas(&self) -> Result<HashMap<NodeId, Inferred>> {
        let order = self.graph.topological_order()?;
        let mut inferred: HashMap<NodeId, Inferred> = HashMap::new();
        for id in order {
            let node = self.graph.node(id)?;
            let inputs: Vec<&Inferred> = node
                .input_nodes()
                .iter()
                .map(|input| &inferred[input])
                .collect();
            let mut entry = infer::infer_node(node, &inputs);
            if matches!(entry, Inferred::Unknown) {
                if let Some(schema) = self.registry.get_schema(id) {
                    entry = Inferred::Known(schema.clone());
                }
            }
            inferred.insert(id, entry);
        }
        Ok(inferred)
    }
}
