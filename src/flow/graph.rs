//! Flow graph storage and structural operations.
//!
//! The graph is a directed acyclic set of nodes keyed by id. Acyclicity is
//! enforced at edge insertion time and re-checked by the topological sort,
//! so execution can assume a valid ordering exists.

use crate::error::{FlowError, Result};
use crate::flow::id::NodeId;
use crate::flow::node::{InputSlot, Node};
use crate::flow::settings::{NodeKind, NodeSettings};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: IndexMap<NodeId, Node>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(FlowError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(FlowError::NodeNotFound(id))
    }

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(FlowError::InvalidEdge(format!(
                "node {} already exists",
                node.id
            )));
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Insert a fresh node of `kind` with default settings.
    pub fn add_node_of_kind(&mut self, id: NodeId, kind: NodeKind) -> Result<()> {
        self.add_node(Node::new(id, NodeSettings::default_for(kind)))
    }

    /// Replace a node's settings. The kind may not change; swapping kinds is
    /// a remove-and-re-add at the call site.
    pub fn update_settings(&mut self, id: NodeId, settings: NodeSettings) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.settings.kind() != settings.kind() {
            return Err(FlowError::InvalidEdge(format!(
                "node {id} is a {} node, cannot store {} settings",
                node.settings.kind(),
                settings.kind()
            )));
        }
        node.settings = settings;
        Ok(())
    }

    /// Remove a node and every reference other nodes hold to it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let removed = self
            .nodes
            .shift_remove(&id)
            .ok_or(FlowError::NodeNotFound(id))?;
        for node in self.nodes.values_mut() {
            node.clear_references_to(id);
        }
        Ok(removed)
    }

    /// Connect `source` into `target`'s given slot. Fails on unknown nodes,
    /// self-loops, occupied join slots, and edges that would close a cycle.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, slot: InputSlot) -> Result<()> {
        if !self.contains(source) {
            return Err(FlowError::NodeNotFound(source));
        }
        if source == target {
            return Err(FlowError::InvalidEdge(format!(
                "node {target} cannot feed itself"
            )));
        }
        if self.would_create_cycle(source, target) {
            return Err(FlowError::EdgeWouldCycle {
                from_node: source,
                to_node: target,
            });
        }
        let node = self.node_mut(target)?;
        match slot {
            InputSlot::Right => {
                if !node.kind().takes_right_input() {
                    return Err(FlowError::InvalidEdge(format!(
                        "{} node {target} has no right input slot",
                        node.kind()
                    )));
                }
                node.right_input_id = Some(source);
            }
            InputSlot::Default => {
                if node.kind().is_source() {
                    return Err(FlowError::InvalidEdge(format!(
                        "{} node {target} takes no inputs",
                        node.kind()
                    )));
                }
                if node.kind().takes_right_input() {
                    node.left_input_id = Some(source);
                } else if !node.input_ids.contains(&source) {
                    node.input_ids.push(source);
                }
            }
        }
        Ok(())
    }

    pub fn remove_edge(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        self.node_mut(target)?.clear_references_to(source);
        Ok(())
    }

    /// All edges, derived from node input fields.
    pub fn edges(&self) -> Vec<(NodeId, NodeId, InputSlot)> {
        self.nodes
            .values()
            .flat_map(|node| {
                node.declared_inputs()
                    .into_iter()
                    .map(move |(source, slot)| (source, node.id, slot))
            })
            .collect()
    }

    pub fn inputs_of(&self, id: NodeId) -> Result<Vec<(NodeId, InputSlot)>> {
        Ok(self.node(id)?.declared_inputs())
    }

    /// Downstream adjacency: node id → ids it feeds.
    pub fn adjacency(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.nodes.values() {
            for (source, _) in node.declared_inputs() {
                adjacency.entry(source).or_default().push(node.id);
            }
        }
        adjacency
    }

    /// The node itself plus everything reachable downstream of it.
    pub fn downstream_of(&self, id: NodeId) -> Vec<NodeId> {
        let adjacency = self.adjacency();
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(next) = adjacency.get(&current) {
                queue.extend(next.iter().copied());
            }
        }
        order
    }

    /// True if connecting `source -> target` would close a cycle, i.e.
    /// `source` is already reachable from `target`.
    pub fn would_create_cycle(&self, source: NodeId, target: NodeId) -> bool {
        self.downstream_of(target).contains(&source)
    }

    /// Deterministic topological order over all nodes: depth-first over
    /// declared inputs, tie-broken by node insertion order. Declared inputs
    /// that reference missing nodes or close a cycle are structural errors.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        // Iterative DFS; a node is emitted once all its inputs are emitted.
        for &root in self.nodes.keys() {
            if marks.contains_key(&root) {
                continue;
            }
            let mut stack = vec![(root, false)];
            while let Some((id, inputs_done)) = stack.pop() {
                if inputs_done {
                    marks.insert(id, Mark::Done);
                    order.push(id);
                    continue;
                }
                match marks.get(&id) {
                    Some(Mark::Done) => continue,
                    Some(Mark::Visiting) => return Err(FlowError::CycleDetected),
                    None => {}
                }
                marks.insert(id, Mark::Visiting);
                stack.push((id, true));
                let node = self.node(id)?;
                for (input, _) in node.declared_inputs().into_iter().rev() {
                    if !self.contains(input) {
                        return Err(FlowError::NodeNotFound(input));
                    }
                    match marks.get(&input) {
                        Some(Mark::Done) => {}
                        Some(Mark::Visiting) => return Err(FlowError::CycleDetected),
                        None => stack.push((input, false)),
                    }
                }
            }
        }
        Ok(order)
    }
}
