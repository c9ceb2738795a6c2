//! Deferred query plans.
//!
//! A [`LazyPlan`] is an immutable, reference-counted operation tree. Nothing
//! is evaluated until [`collect`](crate::engine::exec::collect) runs the
//! plan; until then the plan can answer two cheap questions:
//!
//! - [`LazyPlan::schema`] — the output columns, computed structurally.
//! - [`LazyPlan::identity_hash`] — an xxh3 hash of a stable, order-sensitive
//!   serialization of the tree, used as the change-detection key for the
//!   preview cache. Scan nodes contribute a precomputed content fingerprint
//!   so re-loaded data with different content hashes differently.

use crate::engine::frame::{DataFrame, FrameRef};
use crate::types::{ColumnDef, DataType, Schema, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Join strategies supported by the engine's join primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinHow {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

impl JoinHow {
    /// Semi/anti joins only ever emit left-side columns.
    pub fn keeps_left_only(self) -> bool {
        matches!(self, JoinHow::Semi | JoinHow::Anti)
    }
}

/// Aggregation functions for group-by and pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    NUnique,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    First,
    Last,
    Concat,
}

impl Aggregation {
    /// Output type for an aggregation over a column of `input` type.
    ///
    /// count/n_unique are integer counts; sum stays integer for integer
    /// input and widens to float otherwise; mean/median are always float;
    /// order/pick aggregations preserve the input type; concat is a string
    /// join.
    pub fn output_type(self, input: DataType) -> DataType {
        match self {
            Aggregation::Count | Aggregation::NUnique => DataType::Int64,
            Aggregation::Sum => match input {
                DataType::Int64 => DataType::Int64,
                _ => DataType::Float64,
            },
            Aggregation::Mean | Aggregation::Median => DataType::Float64,
            Aggregation::Min | Aggregation::Max | Aggregation::First | Aggregation::Last => input,
            Aggregation::Concat => DataType::String,
        }
    }
}

/// One aggregation request: source column, function, output column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggSpec {
    pub column: String,
    pub agg: Aggregation,
    pub alias: String,
}

/// Comparison operators for basic filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Contains,
}

/// A filter predicate: either a single column comparison or a free-form
/// expression evaluated per row by the scripting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    Expression {
        expr: String,
    },
}

/// One resolved select-list entry: source column and output name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectColumn {
    pub source: String,
    pub output: String,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

/// Which duplicate row to keep in a unique/distinct operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    #[default]
    First,
    Last,
}

/// Collision suffixes applied to same-named non-key columns during joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSuffixes {
    pub left: String,
    pub right: String,
}

impl Default for JoinSuffixes {
    fn default() -> Self {
        Self {
            left: "_left".to_string(),
            right: "_right".to_string(),
        }
    }
}

/// The operation tree. Constructed by node executors, never by hand in the
/// core loop; every constructor validates column references eagerly so
/// `schema()` can stay infallible.
#[derive(Debug)]
pub enum PlanOp {
    /// A materialized frame (source data, or the eager result of pivot and
    /// expression-code nodes re-entering the lazy world).
    Scan {
        frame: FrameRef,
        fingerprint: u64,
        label: String,
    },
    Filter {
        input: LazyPlan,
        predicate: Predicate,
    },
    Select {
        input: LazyPlan,
        columns: Vec<SelectColumn>,
    },
    GroupBy {
        input: LazyPlan,
        keys: Vec<String>,
        aggs: Vec<AggSpec>,
    },
    Join {
        left: LazyPlan,
        right: LazyPlan,
        how: JoinHow,
        left_on: Vec<String>,
        right_on: Vec<String>,
        suffixes: JoinSuffixes,
    },
    Sort {
        input: LazyPlan,
        by: Vec<SortKey>,
    },
    Unique {
        input: LazyPlan,
        subset: Option<Vec<String>>,
        keep: KeepStrategy,
    },
    Head {
        input: LazyPlan,
        n: usize,
    },
    Unpivot {
        input: LazyPlan,
        index: Vec<String>,
        on: Vec<String>,
    },
}

/// A deferred, shareable query plan.
#[derive(Debug, Clone)]
pub struct LazyPlan(Arc<PlanOp>);

impl LazyPlan {
    pub fn scan(frame: FrameRef, label: impl Into<String>) -> Self {
        let fingerprint = frame.fingerprint();
        Self(Arc::new(PlanOp::Scan {
            frame,
            fingerprint,
            label: label.into(),
        }))
    }

    pub fn from_frame(frame: DataFrame, label: impl Into<String>) -> Self {
        Self::scan(Arc::new(frame), label)
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        Self(Arc::new(PlanOp::Filter {
            input: self,
            predicate,
        }))
    }

    pub fn select(self, columns: Vec<SelectColumn>) -> Self {
        Self(Arc::new(PlanOp::Select {
            input: self,
            columns,
        }))
    }

    pub fn group_by(self, keys: Vec<String>, aggs: Vec<AggSpec>) -> Self {
        Self(Arc::new(PlanOp::GroupBy {
            input: self,
            keys,
            aggs,
        }))
    }

    pub fn join(
        self,
        right: LazyPlan,
        how: JoinHow,
        left_on: Vec<String>,
        right_on: Vec<String>,
        suffixes: JoinSuffixes,
    ) -> Self {
        Self(Arc::new(PlanOp::Join {
            left: self,
            right,
            how,
            left_on,
            right_on,
            suffixes,
        }))
    }

    pub fn sort(self, by: Vec<SortKey>) -> Self {
        Self(Arc::new(PlanOp::Sort { input: self, by }))
    }

    pub fn unique(self, subset: Option<Vec<String>>, keep: KeepStrategy) -> Self {
        Self(Arc::new(PlanOp::Unique {
            input: self,
            subset,
            keep,
        }))
    }

    pub fn head(self, n: usize) -> Self {
        Self(Arc::new(PlanOp::Head { input: self, n }))
    }

    pub fn unpivot(self, index: Vec<String>, on: Vec<String>) -> Self {
        Self(Arc::new(PlanOp::Unpivot {
            input: self,
            index,
            on,
        }))
    }

    pub fn op(&self) -> &PlanOp {
        &self.0
    }

    /// Structural output schema, computed without evaluating anything.
    pub fn schema(&self) -> Schema {
        match self.op() {
            PlanOp::Scan { frame, .. } => frame.schema(),
            PlanOp::Filter { input, .. }
            | PlanOp::Sort { input, .. }
            | PlanOp::Unique { input, .. }
            | PlanOp::Head { input, .. } => input.schema(),
            PlanOp::Select { input, columns } => {
                let input_schema = input.schema();
                Schema::new(
                    columns
                        .iter()
                        .filter_map(|c| {
                            input_schema
                                .get(&c.source)
                                .map(|def| ColumnDef::new(c.output.clone(), def.data_type))
                        })
                        .collect(),
                )
            }
            PlanOp::GroupBy { input, keys, aggs } => {
                group_by_schema(&input.schema(), keys, aggs)
            }
            PlanOp::Join {
                left,
                right,
                how,
                left_on: _,
                right_on,
                suffixes,
            } => join_schema(&left.schema(), &right.schema(), *how, right_on, suffixes),
            PlanOp::Unpivot { input, index, on } => {
                unpivot_schema(&input.schema(), index, on)
            }
        }
    }

    /// Stable, order-sensitive serialization of the tree, for hashing.
    pub fn stable_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_stable(&mut out);
        out
    }

    /// Plan-identity hash used as the preview-cache change-detection key.
    pub fn identity_hash(&self) -> u64 {
        xxh3_64(&self.stable_bytes())
    }

    fn write_stable(&self, out: &mut Vec<u8>) {
        match self.op() {
            PlanOp::Scan {
                fingerprint, label, ..
            } => {
                out.extend_from_slice(b"scan;");
                out.extend_from_slice(label.as_bytes());
                out.push(b';');
                out.extend_from_slice(&fingerprint.to_le_bytes());
            }
            PlanOp::Filter { input, predicate } => {
                out.extend_from_slice(b"filter;");
                write_json(out, predicate);
                input.write_stable(out);
            }
            PlanOp::Select { input, columns } => {
                out.extend_from_slice(b"select;");
                write_json(out, columns);
                input.write_stable(out);
            }
            PlanOp::GroupBy { input, keys, aggs } => {
                out.extend_from_slice(b"group_by;");
                write_json(out, keys);
                write_json(out, aggs);
                input.write_stable(out);
            }
            PlanOp::Join {
                left,
                right,
                how,
                left_on,
                right_on,
                suffixes,
            } => {
                out.extend_from_slice(b"join;");
                write_json(out, how);
                write_json(out, left_on);
                write_json(out, right_on);
                write_json(out, suffixes);
                left.write_stable(out);
                out.push(b'|');
                right.write_stable(out);
            }
            PlanOp::Sort { input, by } => {
                out.extend_from_slice(b"sort;");
                write_json(out, by);
                input.write_stable(out);
            }
            PlanOp::Unique {
                input,
                subset,
                keep,
            } => {
                out.extend_from_slice(b"unique;");
                write_json(out, subset);
                write_json(out, keep);
                input.write_stable(out);
            }
            PlanOp::Head { input, n } => {
                out.extend_from_slice(b"head;");
                out.extend_from_slice(&(*n as u64).to_le_bytes());
                input.write_stable(out);
            }
            PlanOp::Unpivot { input, index, on } => {
                out.extend_from_slice(b"unpivot;");
                write_json(out, index);
                write_json(out, on);
                input.write_stable(out);
            }
        }
    }
}

fn write_json<T: Serialize>(out: &mut Vec<u8>, value: &T) {
    // Struct serialization preserves field order, so this is stable.
    if let Ok(bytes) = serde_json::to_vec(value) {
        out.extend_from_slice(&bytes);
    }
    out.push(b';');
}

/// Output schema of a group-by: key columns (type preserved) followed by one
/// column per aggregation. Aggregations over unknown columns are skipped.
pub fn group_by_schema(input: &Schema, keys: &[String], aggs: &[AggSpec]) -> Schema {
    let mut out = Schema::empty();
    for key in keys {
        if let Some(def) = input.get(key) {
            out.push(ColumnDef::new(key.clone(), def.data_type));
        }
    }
    for spec in aggs {
        if let Some(def) = input.get(&spec.column) {
            out.push(ColumnDef::new(
                spec.alias.clone(),
                spec.agg.output_type(def.data_type),
            ));
        }
    }
    out
}

/// Output schema of a join.
///
/// Semi/anti: exactly the left schema. Otherwise: all left columns (suffixed
/// when the right side has a same-named column that is not a right join
/// key), then all right columns except right join keys (suffixed when they
/// collide with a left name).
pub fn join_schema(
    left: &Schema,
    right: &Schema,
    how: JoinHow,
    right_on: &[String],
    suffixes: &JoinSuffixes,
) -> Schema {
    if how.keeps_left_only() {
        return left.clone();
    }
    let mut out = Schema::empty();
    for def in left.fields() {
        let collides = right.contains(&def.name) && !right_on.contains(&def.name);
        let name = if collides {
            format!("{}{}", def.name, suffixes.left)
        } else {
            def.name.clone()
        };
        out.push(ColumnDef::new(name, def.data_type));
    }
    for def in right.fields() {
        if right_on.contains(&def.name) {
            continue;
        }
        let name = if left.contains(&def.name) {
            format!("{}{}", def.name, suffixes.right)
        } else {
            def.name.clone()
        };
        out.push(ColumnDef::new(name, def.data_type));
    }
    out
}

/// Output schema of an unpivot: declared index columns (type preserved) plus
/// the synthetic "variable" (string) and "value" columns. The value type is
/// best-effort: the shared type of the melted columns, else string.
pub fn unpivot_schema(input: &Schema, index: &[String], on: &[String]) -> Schema {
    let mut out = Schema::empty();
    for name in index {
        if let Some(def) = input.get(name) {
            out.push(ColumnDef::new(name.clone(), def.data_type));
        }
    }
    let melted: Vec<DataType> = input
        .fields()
        .iter()
        .filter(|def| {
            if on.is_empty() {
                !index.contains(&def.name)
            } else {
                on.contains(&def.name)
            }
        })
        .map(|def| def.data_type)
        .collect();
    let value_type = match melted.split_first() {
        Some((first, rest)) if rest.iter().all(|t| t == first) => *first,
        _ => DataType::String,
    };
    out.push(ColumnDef::new("variable", DataType::String));
    out.push(ColumnDef::new("value", value_type));
    out
}
