//! Per-kind plan construction.
//!
//! [`build_plan`] turns one configured node plus the plans of its inputs
//! into the node's own lazy plan. Most kinds extend the plan tree without
//! touching data; pivot, code, and output nodes must materialize, and their
//! result is rewrapped as a scan so downstream plans keep an exact
//! structural schema.

use crate::engine::exec::{self, check_columns};
use crate::engine::frame::{DataFrame, FrameRef};
use crate::engine::plan::LazyPlan;
use crate::engine::script;
use crate::error::{FlowError, Result};
use crate::flow::content::ContentStore;
use crate::flow::node::Node;
use crate::flow::settings::NodeSettings;
use std::sync::Arc;
use tracing::debug;

fn single_input(node: &Node, inputs: &[LazyPlan]) -> Result<LazyPlan> {
    inputs.first().cloned().ok_or_else(|| {
        FlowError::InvalidEdge(format!("{} node {} has no input", node.kind(), node.id))
    })
}

/// Build the lazy plan for one node from its settings and input plans
/// (ordered as the node declares them: left, right, then the rest).
pub fn build_plan(
    node: &Node,
    inputs: &[LazyPlan],
    content: &dyn ContentStore,
) -> Result<LazyPlan> {
    match &node.settings {
        NodeSettings::Read(settings) => {
            // Attached content wins over the configured path.
            if let Some(frame) = content.get(node.id) {
                return Ok(LazyPlan::scan(frame, format!("read:{}", node.id)));
            }
            if settings.path.is_empty() {
                return Err(FlowError::Engine(format!(
                    "read node {} has no path and no attached content",
                    node.id
                )));
            }
            let frame = DataFrame::from_csv_path(&settings.path)?;
            Ok(LazyPlan::from_frame(frame, format!("read:{}", settings.path)))
        }

        NodeSettings::ManualInput(settings) => Ok(LazyPlan::from_frame(
            settings.to_frame()?,
            format!("manual:{}", node.id),
        )),

        NodeSettings::Filter(settings) => {
            let input = single_input(node, inputs)?;
            match &settings.predicate {
                Some(predicate) => Ok(input.filter(predicate.clone())),
                None => {
                    debug!(node = %node.id, "filter not configured, passing rows through");
                    Ok(input)
                }
            }
        }

        NodeSettings::Select(settings) => {
            let input = single_input(node, inputs)?;
            Ok(input.select(settings.to_select_columns()))
        }

        NodeSettings::GroupBy(settings) => {
            let input = single_input(node, inputs)?;
            let schema = input.schema();
            check_columns(&schema, &settings.keys)?;
            for spec in &settings.aggregations {
                check_columns(&schema, std::slice::from_ref(&spec.column))?;
            }
            Ok(input.group_by(settings.keys.clone(), settings.aggregations.clone()))
        }

        NodeSettings::Join(settings) => {
            let left = single_input(node, inputs)?;
            let right = inputs.get(1).cloned().ok_or_else(|| {
                FlowError::InvalidEdge(format!("join node {} has no right input", node.id))
            })?;
            check_columns(&left.schema(), &settings.left_on)?;
            check_columns(&right.schema(), &settings.right_on)?;
            Ok(left.join(
                right,
                settings.how,
                settings.left_on.clone(),
                settings.right_on.clone(),
                settings.suffixes.clone(),
            ))
        }

        NodeSettings::Sort(settings) => {
            let input = single_input(node, inputs)?;
            let schema = input.schema();
            for key in &settings.by {
                check_columns(&schema, std::slice::from_ref(&key.column))?;
            }
            Ok(input.sort(settings.by.clone()))
        }

        NodeSettings::ExpressionCode(settings) => {
            // Scripts see materialized frames, so this node is an eager
            // boundary in the otherwise lazy plan tree.
            let mut named: Vec<(String, FrameRef)> = Vec::new();
            for (i, plan) in inputs.iter().enumerate() {
                let frame = Arc::new(exec::collect(plan)?);
                if i == 0 {
                    named.push(("input".to_string(), frame.clone()));
                }
                named.push((format!("input_{}", i + 1), frame));
            }
            let out = script::run_code_node(&named, &settings.code)?;
            Ok(LazyPlan::from_frame(out, format!("code:{}", node.id)))
        }

        NodeSettings::Unique(settings) => {
            let input = single_input(node, inputs)?;
            if let Some(subset) = &settings.subset {
                check_columns(&input.schema(), subset)?;
            }
            Ok(input.unique(settings.subset.clone(), settings.keep))
        }

        NodeSettings::Head(settings) => Ok(single_input(node, inputs)?.head(settings.n)),

        // Preview nodes mark a sampling point; the plan is the input's.
        NodeSettings::Preview(_) => single_input(node, inputs),

        NodeSettings::Pivot(settings) => {
            let input = single_input(node, inputs)?;
            let frame = exec::collect(&input)?;
            let out = exec::pivot(
                &frame,
                &settings.index,
                &settings.on,
                &settings.values,
                settings.agg,
            )?;
            Ok(LazyPlan::from_frame(out, format!("pivot:{}", node.id)))
        }

        NodeSettings::Unpivot(settings) => {
            let input = single_input(node, inputs)?;
            let schema = input.schema();
            check_columns(&schema, &settings.index)?;
            check_columns(&schema, &settings.on)?;
            Ok(input.unpivot(settings.index.clone(), settings.on.clone()))
        }

        NodeSettings::Output(settings) => {
            let input = single_input(node, inputs)?;
            if settings.path.is_empty() {
                return Err(FlowError::Engine(format!(
                    "output node {} has no path",
                    node.id
                )));
            }
            let frame = exec::collect(&input)?;
            frame.write_csv_path(&settings.path)?;
            debug!(node = %node.id, path = %settings.path, rows = frame.height(), "wrote output file");
            Ok(LazyPlan::from_frame(frame, format!("output:{}", settings.path)))
        }
    }
}
