//! A single node in the flow graph.
//!
//! Nodes record their own upstream references (`input_ids` plus the
//! dedicated left/right slots used by joins). Edges are derived from these
//! fields, never stored separately, so there is one source of truth.

use crate::flow::id::NodeId;
use crate::flow::settings::{NodeKind, NodeSettings};
use serde::{Deserialize, Serialize};

/// Which input slot an upstream node feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSlot {
    /// The main (or left, for joins) input.
    #[default]
    Default,
    /// The right side of a join.
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Canvas position, carried for the host UI but ignored by execution.
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub description: String,
    pub settings: NodeSettings,
    /// Upstream nodes feeding the default slot, in order.
    #[serde(default)]
    pub input_ids: Vec<NodeId>,
    /// Join left input; takes precedence over `input_ids` when set.
    #[serde(default)]
    pub left_input_id: Option<NodeId>,
    /// Join right input.
    #[serde(default)]
    pub right_input_id: Option<NodeId>,
}

impl Node {
    pub fn new(id: NodeId, settings: NodeSettings) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            description: String::new(),
            settings,
            input_ids: Vec::new(),
            left_input_id: None,
            right_input_id: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.settings.kind()
    }

    /// All upstream references with their slots, deduplicated in slot order:
    /// left, right, then the general input list.
    pub fn declared_inputs(&self) -> Vec<(NodeId, InputSlot)> {
        let mut inputs = Vec::new();
        if let Some(left) = self.left_input_id {
            inputs.push((left, InputSlot::Default));
        }
        if let Some(right) = self.right_input_id {
            inputs.push((right, InputSlot::Right));
        }
        for &id in &self.input_ids {
            if !inputs.iter().any(|(seen, _)| *seen == id) {
                inputs.push((id, InputSlot::Default));
            }
        }
        inputs
    }

    /// Upstream ids only, slot order preserved.
    pub fn input_nodes(&self) -> Vec<NodeId> {
        self.declared_inputs().into_iter().map(|(id, _)| id).collect()
    }

    /// Drop every reference to `target`, in whichever slot it occupies.
    pub fn clear_references_to(&mut self, target: NodeId) {
        if self.left_input_id == Some(target) {
            self.left_input_id = None;
        }
        if self.right_input_id == Some(target) {
            self.right_input_id = None;
        }
        self.input_ids.retain(|&id| id != target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::settings::{JoinSettings, NodeKind};

    #[test]
    fn test_declared_inputs_slot_order() {
        let mut node = Node::new(NodeId(3), NodeSettings::Join(JoinSettings::default()));
        node.left_input_id = Some(NodeId(1));
        node.right_input_id = Some(NodeId(2));
        node.input_ids = vec![NodeId(1), NodeId(4)];
        assert_eq!(
            node.declared_inputs(),
            vec![
                (NodeId(1), InputSlot::Default),
                (NodeId(2), InputSlot::Right),
                (NodeId(4), InputSlot::Default),
            ]
        );
    }

    #[test]
    fn test_clear_references() {
        let mut node = Node::new(NodeId(3), NodeSettings::default_for(NodeKind::Join));
        node.left_input_id = Some(NodeId(1));
        node.right_input_id = Some(NodeId(1));
        node.input_ids = vec![NodeId(1), NodeId(2)];
        node.clear_references_to(NodeId(1));
        assert_eq!(node.left_input_id, None);
        assert_eq!(node.right_input_id, None);
        assert_eq!(node.input_ids, vec![NodeId(2)]);
    }
}
