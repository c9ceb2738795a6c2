//! Error handling for flowframe.
//!
//! Structural problems (cycles, missing nodes, malformed documents) are hard
//! errors and abort the operation that hit them. Per-node execution failures
//! are *not* represented here — they are recorded as data in the
//! [`NodeResult`](crate::flow::executor::NodeResult) map so that independent
//! branches of a flow keep running.

use crate::flow::id::NodeId;
use thiserror::Error;

/// Main error type for flowframe operations.
#[derive(Error, Debug)]
pub enum FlowError {
    /// The graph does not form a DAG; no topological order exists.
    #[error("cycle detected in flow graph")]
    CycleDetected,

    /// A node id was referenced that does not exist in the graph.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// Connecting the requested edge would make the graph cyclic.
    #[error("edge {from_node} -> {to_node} would create a cycle")]
    EdgeWouldCycle { from_node: NodeId, to_node: NodeId },

    /// A malformed edge request (self-loop, wrong slot for the node kind).
    #[error("invalid edge: {0}")]
    InvalidEdge(String),

    /// A flow document failed structural validation before node construction.
    #[error("malformed flow document: {0}")]
    Document(String),

    /// A referenced column does not exist in the frame being transformed.
    ///
    /// The message enumerates the available columns and, when a near-match
    /// exists, suggests it.
    #[error("column '{name}' not found; available columns: [{available}]{suggestion}")]
    ColumnNotFound {
        name: String,
        available: String,
        suggestion: String,
    },

    /// A user expression or code node failed to evaluate.
    #[error("script error: {0}")]
    Script(String),

    /// The dataframe engine raised while building or evaluating a plan.
    #[error("engine error: {0}")]
    Engine(String),

    /// IO errors (reading source files, writing output files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse/write errors.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization errors while converting documents or settings payloads.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for FlowError {
    fn from(err: serde_yaml::Error) -> Self {
        FlowError::Serialization(err.to_string())
    }
}

impl FlowError {
    /// Build a [`FlowError::ColumnNotFound`] for `name` against the columns
    /// of `schema`, suggesting near-matches by substring similarity.
    pub fn column_not_found(name: &str, schema: &crate::types::Schema) -> Self {
        let available = schema.names().join(", ");
        let suggestion = match suggest_column(name, schema) {
            Some(s) => format!("; did you mean '{s}'?"),
            None => String::new(),
        };
        FlowError::ColumnNotFound {
            name: name.to_string(),
            available,
            suggestion,
        }
    }

    /// True for errors that abort the whole operation rather than being
    /// recorded against a single node.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FlowError::CycleDetected
                | FlowError::NodeNotFound(_)
                | FlowError::EdgeWouldCycle { .. }
                | FlowError::InvalidEdge(_)
                | FlowError::Document(_)
        )
    }
}

/// Pick the closest column name by substring overlap.
///
/// A candidate scores by how much of it appears in the query or how much of
/// the query appears in it, case-insensitive. Ties keep the first candidate.
fn suggest_column(name: &str, schema: &crate::types::Schema) -> Option<String> {
    let query = name.to_lowercase();
    let mut best: Option<(usize, &str)> = None;
    for candidate in schema.names() {
        let lower = candidate.to_lowercase();
        let score = if lower.contains(&query) {
            query.len()
        } else if query.contains(&lower) {
            lower.len()
        } else {
            common_prefix_len(&lower, &query)
        };
        if score >= 2 && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, c)| c.to_string())
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Result type alias for flowframe operations.
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Schema};

    fn schema() -> Schema {
        Schema::from_pairs(vec![
            ("customer_id", DataType::Int64),
            ("amount", DataType::Float64),
        ])
    }

    #[test]
    fn test_column_error_lists_available() {
        let err = FlowError::column_not_found("amonut", &schema());
        let msg = err.to_string();
        assert!(msg.contains("customer_id, amount"));
    }

    #[test]
    fn test_column_error_suggests_near_match() {
        let err = FlowError::column_not_found("amount_eur", &schema());
        assert!(err.to_string().contains("did you mean 'amount'"));
    }

    #[test]
    fn test_structural_classification() {
        assert!(FlowError::CycleDetected.is_structural());
        assert!(!FlowError::Script("boom".into()).is_structural());
    }

    #[test]
    fn test_cycle_edge_names_both_endpoints() {
        let err = FlowError::EdgeWouldCycle {
            from_node: NodeId(1),
            to_node: NodeId(2),
        };
        assert_eq!(err.to_string(), "edge 1 -> 2 would create a cycle");
        // Neither endpoint is a wrapped cause.
        assert!(std::error::Error::source(&err).is_none());
    }
}
