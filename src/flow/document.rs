//! Flow document: the persisted YAML/JSON form of a flow.
//!
//! The document stores nodes with their upstream references; a separate
//! `connections` list is accepted on import for compatibility but never
//! written, since node input fields are the single source of truth for
//! edges.

use crate::config::FlowSettings;
use crate::error::{FlowError, Result};
use crate::flow::graph::FlowGraph;
use crate::flow::id::NodeId;
use crate::flow::node::{InputSlot, Node};
use crate::flow::settings::{NodeKind, NodeSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DOCUMENT_VERSION: u32 = 1;

/// Keys stripped from settings payloads on export. Hosts sometimes mirror
/// node-level state into settings maps; none of it is configuration.
const TRANSIENT_KEYS: [&str; 7] = ["id", "position", "x", "y", "is_setup", "setup", "description"];

/// One node as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub is_start_node: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_input_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_input_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_ids: Vec<NodeId>,
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Edge record accepted on import for compatibility with hosts that
/// persist explicit connection lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: NodeId,
    pub to_node: NodeId,
    #[serde(default)]
    pub to_slot: InputSlot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    pub version: u32,
    /// Host-assigned document identifier, carried through round-trips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: FlowSettings,
    pub nodes: Vec<DocumentNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<Connection>>,
}

impl FlowDocument {
    /// Snapshot a graph into document form, nodes in insertion order.
    pub fn from_graph(name: impl Into<String>, graph: &FlowGraph, settings: &FlowSettings) -> Result<Self> {
        let adjacency = graph.adjacency();
        let mut nodes = Vec::with_capacity(graph.len());
        for node in graph.nodes() {
            let mut payload = node.settings.to_payload()?;
            if let Some(map) = payload.as_object_mut() {
                for key in TRANSIENT_KEYS {
                    map.remove(key);
                }
            }
            nodes.push(DocumentNode {
                id: node.id,
                kind: node.kind(),
                is_start_node: node.declared_inputs().is_empty(),
                description: node.description.clone(),
                x: node.x,
                y: node.y,
                left_input_id: node.left_input_id,
                right_input_id: node.right_input_id,
                input_ids: node.input_ids.clone(),
                output_ids: adjacency.get(&node.id).cloned().unwrap_or_default(),
                settings: payload,
            });
        }
        Ok(Self {
            version: DOCUMENT_VERSION,
            id: None,
            name: name.into(),
            settings: settings.clone(),
            nodes,
            connections: None,
        })
    }

    /// Rebuild the graph. Node input fields define the edges; an explicit
    /// connections list fills slots the node fields left empty.
    pub fn to_graph(&self) -> Result<(FlowGraph, FlowSettings)> {
        let mut graph = FlowGraph::new();
        for doc_node in &self.nodes {
            let settings = NodeSettings::from_payload(doc_node.kind, doc_node.settings.clone())?;
            let mut node = Node::new(doc_node.id, settings);
            node.description = doc_node.description.clone();
            node.x = doc_node.x;
            node.y = doc_node.y;
            node.left_input_id = doc_node.left_input_id;
            node.right_input_id = doc_node.right_input_id;
            node.input_ids = doc_node.input_ids.clone();
            graph.add_node(node).map_err(|e| {
                FlowError::Document(format!("node {}: {e}", doc_node.id))
            })?;
        }
        if let Some(connections) = &self.connections {
            for conn in connections {
                let target = graph.node(conn.to_node).map_err(|_| {
                    FlowError::Document(format!(
                        "connection references unknown node {}",
                        conn.to_node
                    ))
                })?;
                let already = target
                    .declared_inputs()
                    .iter()
                    .any(|(source, _)| *source == conn.from_node);
                if !already {
                    graph
                        .add_edge(conn.from_node, conn.to_node, conn.to_slot)
                        .map_err(|e| FlowError::Document(e.to_string()))?;
                }
            }
        }
        // Surface cycles and dangling references at load time.
        graph.topological_order()?;
        Ok((graph, self.settings.clone()))
    }

    // ── Text formats ──

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_yaml::from_str(text)?;
        Self::from_raw(raw)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Shared precheck: reject documents missing the required shape before
    /// field-level deserialization, so the error names the actual problem.
    fn from_raw(raw: serde_json::Value) -> Result<Self> {
        let map = raw
            .as_object()
            .ok_or_else(|| FlowError::Document("document root must be a mapping".into()))?;
        if !map.contains_key("version") {
            return Err(FlowError::Document("document is missing 'version'".into()));
        }
        if !map.contains_key("nodes") {
            return Err(FlowError::Document("document is missing 'nodes'".into()));
        }
        Ok(serde_json::from_value(raw)?)
    }

    // ── File IO, format chosen by extension ──

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match extension(path) {
            Format::Yaml => Self::from_yaml(&text),
            Format::Json => Self::from_json(&text),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = match extension(path) {
            Format::Yaml => self.to_yaml()?,
            Format::Json => self.to_json()?,
        };
        std::fs::write(path, text)?;
        Ok(())
    }
}

enum Format {
    Yaml,
    Json,
}

fn extension(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Format::Json,
        _ => Format::Yaml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::plan::{CompareOp, Predicate};
    use crate::flow::settings::{FilterSettings, JoinSettings};
    use crate::types::Value;

    fn sample_graph() -> FlowGraph {
        let mut graph = FlowGraph::new();
        graph.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
        graph.add_node_of_kind(NodeId(2), NodeKind::Filter).unwrap();
        graph.add_node_of_kind(NodeId(3), NodeKind::Read).unwrap();
        graph.add_node_of_kind(NodeId(4), NodeKind::Join).unwrap();
        graph.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
        graph.add_edge(NodeId(2), NodeId(4), InputSlot::Default).unwrap();
        graph.add_edge(NodeId(3), NodeId(4), InputSlot::Right).unwrap();
        graph
            .update_settings(
                NodeId(2),
                NodeSettings::Filter(FilterSettings {
                    predicate: Some(Predicate::Compare {
                        column: "v".into(),
                        op: CompareOp::Lt,
                        value: Value::Int(10),
                    }),
                }),
            )
            .unwrap();
        graph
    }

    fn edge_set(graph: &FlowGraph) -> Vec<(NodeId, NodeId, InputSlot)> {
        let mut edges = graph.edges();
        edges.sort_by_key(|(a, b, _)| (a.0, b.0));
        edges
    }

    #[test]
    fn test_yaml_round_trip_preserves_edges_and_settings() {
        let graph = sample_graph();
        let doc = FlowDocument::from_graph("test", &graph, &FlowSettings::default()).unwrap();
        let text = doc.to_yaml().unwrap();
        let (back, _) = FlowDocument::from_yaml(&text).unwrap().to_graph().unwrap();
        assert_eq!(edge_set(&graph), edge_set(&back));
        assert_eq!(
            back.node(NodeId(2)).unwrap().settings,
            graph.node(NodeId(2)).unwrap().settings
        );
        assert_eq!(back.node(NodeId(4)).unwrap().kind(), NodeKind::Join);
    }

    #[test]
    fn test_json_round_trip() {
        let graph = sample_graph();
        let doc = FlowDocument::from_graph("test", &graph, &FlowSettings::default()).unwrap();
        let (back, _) = FlowDocument::from_json(&doc.to_json().unwrap())
            .unwrap()
            .to_graph()
            .unwrap();
        assert_eq!(edge_set(&graph), edge_set(&back));
    }

    #[test]
    fn test_start_node_flag_and_no_connection_list() {
        let doc =
            FlowDocument::from_graph("test", &sample_graph(), &FlowSettings::default()).unwrap();
        assert!(doc.connections.is_none());
        let starts: Vec<NodeId> = doc
            .nodes
            .iter()
            .filter(|n| n.is_start_node)
            .map(|n| n.id)
            .collect();
        assert_eq!(starts, vec![NodeId(1), NodeId(3)]);
    }

    #[test]
    fn test_missing_required_keys() {
        let err = FlowDocument::from_yaml("name: x\nnodes: []\n").unwrap_err();
        assert!(err.to_string().contains("version"));
        let err = FlowDocument::from_yaml("version: 1\nname: x\n").unwrap_err();
        assert!(err.to_string().contains("nodes"));
    }

    #[test]
    fn test_connection_list_fills_missing_slots() {
        let text = r#"
version: 1
nodes:
  - id: 1
    type: read
  - id: 2
    type: head
connections:
  - from_node: 1
    to_node: 2
"#;
        let (graph, _) = FlowDocument::from_yaml(text).unwrap().to_graph().unwrap();
        assert_eq!(
            graph.node(NodeId(2)).unwrap().input_nodes(),
            vec![NodeId(1)]
        );
    }

    #[test]
    fn test_cyclic_document_rejected() {
        let text = r#"
version: 1
nodes:
  - id: 1
    type: sort
    input_ids: [2]
  - id: 2
    type: sort
    input_ids: [1]
"#;
        let err = FlowDocument::from_yaml(text).unwrap().to_graph().unwrap_err();
        assert!(matches!(err, FlowError::CycleDetected));
    }

    #[test]
    fn test_unknown_settings_payload_defaults() {
        let text = r#"
version: 1
nodes:
  - id: 1
    type: join
"#;
        let (graph, _) = FlowDocument::from_yaml(text).unwrap().to_graph().unwrap();
        assert_eq!(
            graph.node(NodeId(1)).unwrap().settings,
            NodeSettings::Join(JoinSettings::default())
        );
    }
}
