//! Tabular execution engine: frames, lazy plans, evaluation, and scripting.

pub mod exec;
pub mod frame;
pub mod plan;
pub mod script;

pub use exec::{collect, pivot, preview};
pub use frame::{Column, DataFrame, FrameRef};
pub use plan::{
    AggSpec, Aggregation, CompareOp, JoinHow, JoinSuffixes, KeepStrategy, LazyPlan, PlanOp,
    Predicate, SelectColumn, SortKey,
};
pub use script::{eval_filter_mask, run_code_node, FrameHandle};
