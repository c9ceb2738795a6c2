//! Pure schema inference over the flow graph.
//!
//! Inference never touches data or the filesystem, so it can run on every
//! edit. Nodes whose output schema depends on data (file reads before any
//! run, pivots, code nodes) infer as [`Inferred::Unknown`]; unknown
//! propagates downstream. Execution later replaces Unknown with the exact
//! structural schema of the materialized plan.

use crate::engine::plan::{group_by_schema, join_schema, unpivot_schema};
use crate::error::Result;
use crate::flow::graph::FlowGraph;
use crate::flow::id::NodeId;
use crate::flow::node::Node;
use crate::flow::settings::NodeSettings;
use crate::types::{ColumnDef, Schema};
use std::collections::HashMap;

/// Outcome of inferring one node's output schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Inferred {
    Known(Schema),
    /// Schema depends on data this pass cannot see.
    Unknown,
}

impl Inferred {
    pub fn known(&self) -> Option<&Schema> {
        match self {
            Inferred::Known(schema) => Some(schema),
            Inferred::Unknown => None,
        }
    }
}

/// Infer output schemas for every node, walking in topological order.
/// Structural graph problems (cycles, dangling references) are errors;
/// data-dependent schemas are not, they infer Unknown.
pub fn infer_schemas(graph: &FlowGraph) -> Result<HashMap<NodeId, Inferred>> {
    let order = graph.topological_order()?;
    let mut inferred: HashMap<NodeId, Inferred> = HashMap::new();
    for id in order {
        let node = graph.node(id)?;
        let inputs: Vec<&Inferred> = node
            .input_nodes()
            .iter()
            .map(|input| &inferred[input])
            .collect();
        let result = infer_node(node, &inputs);
        inferred.insert(id, result);
    }
    Ok(inferred)
}

/// Infer a single node's output schema from its settings and the inferred
/// schemas of its inputs, in declared slot order.
pub fn infer_node(node: &Node, inputs: &[&Inferred]) -> Inferred {
    let first = inputs.first().and_then(|i| i.known());
    match &node.settings {
        // Sources: file contents are unknown until read; literal rows are
        // fully determined by the settings.
        NodeSettings::Read(_) => Inferred::Unknown,
        NodeSettings::ManualInput(settings) => match settings.to_frame() {
            Ok(frame) => Inferred::Known(frame.schema()),
            Err(_) => Inferred::Unknown,
        },

        // Row-only transforms pass the input schema through.
        NodeSettings::Filter(_)
        | NodeSettings::Sort(_)
        | NodeSettings::Unique(_)
        | NodeSettings::Head(_)
        | NodeSettings::Preview(_)
        | NodeSettings::Output(_) => match first {
            Some(schema) => Inferred::Known(schema.clone()),
            None => Inferred::Unknown,
        },

        NodeSettings::Select(settings) => match first {
            Some(schema) => {
                let mut out = Schema::empty();
                for column in settings.to_select_columns() {
                    if let Some(def) = schema.get(&column.source) {
                        out.push(ColumnDef::new(column.output, def.data_type));
                    }
                }
                Inferred::Known(out)
            }
            None => Inferred::Unknown,
        },

        NodeSettings::GroupBy(settings) => match first {
            Some(schema) => Inferred::Known(group_by_schema(
                schema,
                &settings.keys,
                &settings.aggregations,
            )),
            None => Inferred::Unknown,
        },

        NodeSettings::Join(settings) => {
            let left = node
                .left_input_id
                .and_then(|_| inputs.first())
                .and_then(|i| i.known());
            let right = node
                .right_input_id
                .and_then(|_| inputs.get(1))
                .and_then(|i| i.known());
            match (left, right) {
                (Some(left), Some(right)) => Inferred::Known(join_schema(
                    left,
                    right,
                    settings.how,
                    &settings.right_on,
                    &settings.suffixes,
                )),
                _ => Inferred::Unknown,
            }
        }

        NodeSettings::Unpivot(settings) => match first {
            Some(schema) => {
                Inferred::Known(unpivot_schema(schema, &settings.index, &settings.on))
            }
            None => Inferred::Unknown,
        },

        // Output columns depend on the data itself.
        NodeSettings::Pivot(_) | NodeSettings::ExpressionCode(_) => Inferred::Unknown,
    }
}
