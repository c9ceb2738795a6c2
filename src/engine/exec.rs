//! Plan evaluation: turns a [`LazyPlan`] into a materialized [`DataFrame`].
//!
//! Evaluation is bottom-up and single-threaded. [`collect`] is the only
//! entry point that touches data; everything above it (schemas, hashes)
//! stays structural.

use crate::engine::frame::{Column, DataFrame};
use crate::engine::plan::{
    join_schema, unpivot_schema, Aggregation, AggSpec, CompareOp, JoinHow, JoinSuffixes,
    KeepStrategy, LazyPlan, PlanOp, Predicate, SelectColumn, SortKey,
};
use crate::engine::script;
use crate::error::{FlowError, Result};
use crate::types::{DataType, GroupKey, Schema, Value};
use indexmap::IndexMap;
use std::cmp::Ordering;

/// Evaluate a plan to a materialized frame.
pub fn collect(plan: &LazyPlan) -> Result<DataFrame> {
    match plan.op() {
        PlanOp::Scan { frame, .. } => Ok(frame.as_ref().clone()),
        PlanOp::Filter { input, predicate } => {
            let df = collect(input)?;
            apply_filter(&df, predicate)
        }
        PlanOp::Select { input, columns } => {
            let df = collect(input)?;
            apply_select(&df, columns)
        }
        PlanOp::GroupBy { input, keys, aggs } => {
            let df = collect(input)?;
            apply_group_by(&df, keys, aggs)
        }
        PlanOp::Join {
            left,
            right,
            how,
            left_on,
            right_on,
            suffixes,
        } => {
            let left_df = collect(left)?;
            let right_df = collect(right)?;
            apply_join(&left_df, &right_df, *how, left_on, right_on, suffixes)
        }
        PlanOp::Sort { input, by } => {
            let df = collect(input)?;
            apply_sort(&df, by)
        }
        PlanOp::Unique {
            input,
            subset,
            keep,
        } => {
            let df = collect(input)?;
            apply_unique(&df, subset.as_deref(), *keep)
        }
        PlanOp::Head { input, n } => Ok(collect(input)?.head(*n)),
        PlanOp::Unpivot { input, index, on } => {
            let df = collect(input)?;
            apply_unpivot(&df, index, on)
        }
    }
}

/// Materialize a bounded row sample plus the exact total row count in a
/// single full evaluation of the plan.
pub fn preview(plan: &LazyPlan, max_rows: usize) -> Result<(DataFrame, usize)> {
    let df = collect(plan)?;
    let total = df.height();
    Ok((df.head(max_rows), total))
}

// ── Filter ──

fn apply_filter(df: &DataFrame, predicate: &Predicate) -> Result<DataFrame> {
    let mask = match predicate {
        Predicate::Compare { column, op, value } => {
            let col = df
                .column(column)
                .ok_or_else(|| FlowError::column_not_found(column, &df.schema()))?;
            col.values
                .iter()
                .map(|cell| compare(cell, *op, value))
                .collect::<Vec<bool>>()
        }
        Predicate::Expression { expr } => script::eval_filter_mask(df, expr)?,
    };
    let indices: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect();
    Ok(df.take_rows(&indices))
}

/// Null cells never satisfy a comparison.
fn compare(cell: &Value, op: CompareOp, rhs: &Value) -> bool {
    if cell.is_null() || rhs.is_null() {
        return false;
    }
    match op {
        CompareOp::Contains => match (cell, rhs) {
            (Value::Str(haystack), needle) => haystack.contains(&needle.to_string()),
            _ => false,
        },
        _ => {
            let ordering = cell.total_cmp(rhs);
            match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::GtEq => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::LtEq => ordering != Ordering::Greater,
                CompareOp::Contains => unreachable!(),
            }
        }
    }
}

// ── Select ──

fn apply_select(df: &DataFrame, columns: &[SelectColumn]) -> Result<DataFrame> {
    let mut out = Vec::new();
    for entry in columns {
        if let Some(col) = df.column(&entry.source) {
            out.push(Column::new(
                entry.output.clone(),
                col.data_type,
                col.values.clone(),
            ));
        }
    }
    DataFrame::new(out)
}

// ── Group by ──

fn apply_group_by(df: &DataFrame, keys: &[String], aggs: &[AggSpec]) -> Result<DataFrame> {
    for key in keys {
        if df.column(key).is_none() {
            return Err(FlowError::column_not_found(key, &df.schema()));
        }
    }
    for spec in aggs {
        if df.column(&spec.column).is_none() {
            return Err(FlowError::column_not_found(&spec.column, &df.schema()));
        }
    }

    // Groups in first-seen row order.
    let mut groups: IndexMap<GroupKey, Vec<usize>> = IndexMap::new();
    if keys.is_empty() {
        groups.insert(GroupKey::from_values([]), (0..df.height()).collect());
    } else {
        let key_columns: Vec<&Column> = keys.iter().filter_map(|k| df.column(k)).collect();
        for row in 0..df.height() {
            let key = GroupKey::from_values(key_columns.iter().map(|c| &c.values[row]));
            groups.entry(key).or_default().push(row);
        }
    }

    let mut columns: Vec<Column> = Vec::new();
    for key in keys {
        let source = df.column(key).expect("validated above");
        let values = groups
            .values()
            .map(|rows| source.values[rows[0]].clone())
            .collect();
        columns.push(Column::new(key.clone(), source.data_type, values));
    }
    for spec in aggs {
        let source = df.column(&spec.column).expect("validated above");
        let values: Vec<Value> = groups
            .values()
            .map(|rows| aggregate(source, rows, spec.agg))
            .collect();
        columns.push(Column::new(
            spec.alias.clone(),
            spec.agg.output_type(source.data_type),
            values,
        ));
    }
    DataFrame::new(columns)
}

fn aggregate(column: &Column, rows: &[usize], agg: Aggregation) -> Value {
    let cells = || rows.iter().map(|&i| &column.values[i]);
    let non_null = || cells().filter(|v| !v.is_null());
    match agg {
        Aggregation::Count => Value::Int(non_null().count() as i64),
        Aggregation::NUnique => {
            let mut seen = std::collections::HashSet::new();
            for cell in cells() {
                seen.insert(GroupKey::from_values([cell]));
            }
            Value::Int(seen.len() as i64)
        }
        Aggregation::Sum => match column.data_type {
            DataType::Int64 => Value::Int(
                non_null()
                    .filter_map(|v| v.as_f64())
                    .map(|f| f as i64)
                    .sum(),
            ),
            _ => Value::Float(non_null().filter_map(|v| v.as_f64()).sum()),
        },
        Aggregation::Mean => {
            let nums: Vec<f64> = non_null().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Float(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Aggregation::Median => {
            let mut nums: Vec<f64> = non_null().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() {
                return Value::Null;
            }
            nums.sort_by(f64::total_cmp);
            let mid = nums.len() / 2;
            if nums.len() % 2 == 1 {
                Value::Float(nums[mid])
            } else {
                Value::Float((nums[mid - 1] + nums[mid]) / 2.0)
            }
        }
        Aggregation::Min => non_null()
            .min_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
        Aggregation::Max => non_null()
            .max_by(|a, b| a.total_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
        Aggregation::First => cells().next().cloned().unwrap_or(Value::Null),
        Aggregation::Last => cells().last().cloned().unwrap_or(Value::Null),
        Aggregation::Concat => Value::Str(
            non_null()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

// ── Join ──

fn apply_join(
    left: &DataFrame,
    right: &DataFrame,
    how: JoinHow,
    left_on: &[String],
    right_on: &[String],
    suffixes: &JoinSuffixes,
) -> Result<DataFrame> {
    if how != JoinHow::Cross {
        if left_on.len() != right_on.len() || left_on.is_empty() {
            return Err(FlowError::Engine(format!(
                "join key lists must be non-empty and equal length (got {} and {})",
                left_on.len(),
                right_on.len()
            )));
        }
        for key in left_on {
            if left.column(key).is_none() {
                return Err(FlowError::column_not_found(key, &left.schema()));
            }
        }
        for key in right_on {
            if right.column(key).is_none() {
                return Err(FlowError::column_not_found(key, &right.schema()));
            }
        }
    }

    // (left row, right row) pairs in output order; None = null-filled side.
    let pairs: Vec<(Option<usize>, Option<usize>)> = match how {
        JoinHow::Cross => (0..left.height())
            .flat_map(|l| (0..right.height()).map(move |r| (Some(l), Some(r))))
            .collect(),
        _ => {
            let right_index = build_key_index(right, right_on);
            let left_keys: Vec<GroupKey> = (0..left.height())
                .map(|row| row_key(left, left_on, row))
                .collect();
            match how {
                JoinHow::Inner => left_keys
                    .iter()
                    .enumerate()
                    .flat_map(|(l, key)| {
                        right_index
                            .get(key)
                            .into_iter()
                            .flatten()
                            .map(move |&r| (Some(l), Some(r)))
                    })
                    .collect(),
                JoinHow::Left => left_keys
                    .iter()
                    .enumerate()
                    .flat_map(|(l, key)| match right_index.get(key) {
                        Some(rows) => rows.iter().map(|&r| (Some(l), Some(r))).collect(),
                        None => vec![(Some(l), None)],
                    })
                    .collect(),
                JoinHow::Right => {
                    let left_index = build_key_index(left, left_on);
                    (0..right.height())
                        .flat_map(|r| {
                            let key = row_key(right, right_on, r);
                            match left_index.get(&key) {
                                Some(rows) => {
                                    rows.iter().map(|&l| (Some(l), Some(r))).collect()
                                }
                                None => vec![(None, Some(r))],
                            }
                        })
                        .collect()
                }
                JoinHow::Full => {
                    let mut matched_right = vec![false; right.height()];
                    let mut pairs: Vec<(Option<usize>, Option<usize>)> = left_keys
                        .iter()
                        .enumerate()
                        .flat_map(|(l, key)| match right_index.get(key) {
                            Some(rows) => rows
                                .iter()
                                .map(|&r| {
                                    matched_right[r] = true;
                                    (Some(l), Some(r))
                                })
                                .collect::<Vec<_>>(),
                            None => vec![(Some(l), None)],
                        })
                        .collect();
                    pairs.extend(
                        matched_right
                            .iter()
                            .enumerate()
                            .filter(|(_, m)| !**m)
                            .map(|(r, _)| (None, Some(r))),
                    );
                    pairs
                }
                JoinHow::Semi => left_keys
                    .iter()
                    .enumerate()
                    .filter(|(_, key)| right_index.contains_key(*key))
                    .map(|(l, _)| (Some(l), None))
                    .collect(),
                JoinHow::Anti => left_keys
                    .iter()
                    .enumerate()
                    .filter(|(_, key)| !right_index.contains_key(*key))
                    .map(|(l, _)| (Some(l), None))
                    .collect(),
                JoinHow::Cross => unreachable!(),
            }
        }
    };

    let out_schema = join_schema(&left.schema(), &right.schema(), how, right_on, suffixes);
    let mut builders: Vec<Vec<Value>> = vec![Vec::with_capacity(pairs.len()); out_schema.len()];

    let right_kept: Vec<usize> = right
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !right_on.contains(&c.name))
        .map(|(i, _)| i)
        .collect();

    for (l, r) in &pairs {
        let mut slot = 0;
        for col in left.columns() {
            // Unmatched right rows still carry their key values into the
            // (left-side) key columns.
            let cell = match l {
                Some(row) => col.values[*row].clone(),
                None => match (r, left_on.iter().position(|k| k == &col.name)) {
                    (Some(row), Some(key_idx)) => right
                        .column(&right_on[key_idx])
                        .map(|c| c.values[*row].clone())
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                },
            };
            builders[slot].push(cell);
            slot += 1;
        }
        if !how.keeps_left_only() {
            for &ci in &right_kept {
                builders[slot].push(match r {
                    Some(row) => right.columns()[ci].values[*row].clone(),
                    None => Value::Null,
                });
                slot += 1;
            }
        }
    }

    let columns = out_schema
        .fields()
        .iter()
        .zip(builders)
        .map(|(def, values)| Column::new(def.name.clone(), def.data_type, values))
        .collect();
    DataFrame::new(columns)
}

fn row_key(df: &DataFrame, on: &[String], row: usize) -> GroupKey {
    GroupKey::from_values(
        on.iter()
            .filter_map(|name| df.column(name))
            .map(|c| &c.values[row]),
    )
}

fn build_key_index(df: &DataFrame, on: &[String]) -> IndexMap<GroupKey, Vec<usize>> {
    let mut index: IndexMap<GroupKey, Vec<usize>> = IndexMap::new();
    for row in 0..df.height() {
        index.entry(row_key(df, on, row)).or_default().push(row);
    }
    index
}

// ── Sort ──

fn apply_sort(df: &DataFrame, by: &[SortKey]) -> Result<DataFrame> {
    let mut key_columns = Vec::new();
    for key in by {
        match df.column(&key.column) {
            Some(col) => key_columns.push((col, key.descending)),
            None => return Err(FlowError::column_not_found(&key.column, &df.schema())),
        }
    }
    let mut indices: Vec<usize> = (0..df.height()).collect();
    indices.sort_by(|&a, &b| {
        for (col, descending) in &key_columns {
            let ordering = col.values[a].total_cmp(&col.values[b]);
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(df.take_rows(&indices))
}

// ── Unique ──

fn apply_unique(
    df: &DataFrame,
    subset: Option<&[String]>,
    keep: KeepStrategy,
) -> Result<DataFrame> {
    let schema = df.schema();
    let key_names: Vec<String> = match subset {
        Some(names) if !names.is_empty() => {
            for name in names {
                if !schema.contains(name) {
                    return Err(FlowError::column_not_found(name, &schema));
                }
            }
            names.to_vec()
        }
        _ => schema.names().iter().map(|s| s.to_string()).collect(),
    };

    // Group id → kept row; output preserves first-occurrence group order.
    let mut chosen: IndexMap<GroupKey, usize> = IndexMap::new();
    for row in 0..df.height() {
        let key = row_key(df, &key_names, row);
        match keep {
            KeepStrategy::First => {
                chosen.entry(key).or_insert(row);
            }
            KeepStrategy::Last => {
                chosen.insert(key, row);
            }
        }
    }
    let indices: Vec<usize> = chosen.values().copied().collect();
    Ok(df.take_rows(&indices))
}

// ── Unpivot ──

fn apply_unpivot(df: &DataFrame, index: &[String], on: &[String]) -> Result<DataFrame> {
    let schema = df.schema();
    for name in index.iter().chain(on.iter()) {
        if !schema.contains(name) {
            return Err(FlowError::column_not_found(name, &schema));
        }
    }
    let melt_names: Vec<String> = if on.is_empty() {
        schema
            .names()
            .iter()
            .filter(|n| !index.contains(&n.to_string()))
            .map(|n| n.to_string())
            .collect()
    } else {
        on.to_vec()
    };

    let out_schema = unpivot_schema(&schema, index, on);
    let value_type = out_schema
        .get("value")
        .map(|d| d.data_type)
        .unwrap_or(DataType::String);

    let mut builders: Vec<Vec<Value>> = vec![Vec::new(); out_schema.len()];
    for melt in &melt_names {
        let source = df.column(melt).expect("validated above");
        for row in 0..df.height() {
            let mut slot = 0;
            for idx_name in index {
                if let Some(col) = df.column(idx_name) {
                    builders[slot].push(col.values[row].clone());
                    slot += 1;
                }
            }
            builders[slot].push(Value::Str(melt.clone()));
            let cell = source.values[row].clone();
            let cell = match (&cell, value_type) {
                (Value::Null, _) => Value::Null,
                (_, DataType::String) if source.data_type != DataType::String => {
                    Value::Str(cell.to_string())
                }
                _ => cell,
            };
            builders[slot + 1].push(cell);
        }
    }

    let columns = out_schema
        .fields()
        .iter()
        .zip(builders)
        .map(|(def, values)| Column::new(def.name.clone(), def.data_type, values))
        .collect();
    DataFrame::new(columns)
}

// ── Pivot (eager) ──

/// Pivot is evaluated eagerly: the distinct values of `on` become columns,
/// so the output schema depends on the data and cannot be expressed as a
/// structural plan node.
pub fn pivot(
    df: &DataFrame,
    index: &[String],
    on: &str,
    values: &str,
    agg: Aggregation,
) -> Result<DataFrame> {
    let schema = df.schema();
    for name in index {
        if !schema.contains(name) {
            return Err(FlowError::column_not_found(name, &schema));
        }
    }
    let on_col = df
        .column(on)
        .ok_or_else(|| FlowError::column_not_found(on, &schema))?;
    let value_col = df
        .column(values)
        .ok_or_else(|| FlowError::column_not_found(values, &schema))?;

    // Distinct pivot headers in first-seen order.
    let mut headers: IndexMap<String, ()> = IndexMap::new();
    for cell in &on_col.values {
        headers.entry(cell.to_string()).or_insert(());
    }

    let mut groups: IndexMap<GroupKey, Vec<usize>> = IndexMap::new();
    if index.is_empty() {
        groups.insert(GroupKey::from_values([]), (0..df.height()).collect());
    } else {
        for row in 0..df.height() {
            groups.entry(row_key(df, index, row)).or_default().push(row);
        }
    }

    let out_type = agg.output_type(value_col.data_type);
    let mut columns: Vec<Column> = Vec::new();
    for idx_name in index {
        let source = df.column(idx_name).expect("validated above");
        let cells = groups
            .values()
            .map(|rows| source.values[rows[0]].clone())
            .collect();
        columns.push(Column::new(idx_name.clone(), source.data_type, cells));
    }
    for header in headers.keys() {
        let cells: Vec<Value> = groups
            .values()
            .map(|rows| {
                let bucket: Vec<usize> = rows
                    .iter()
                    .filter(|&&r| on_col.values[r].to_string() == *header)
                    .copied()
                    .collect();
                if bucket.is_empty() {
                    Value::Null
                } else {
                    aggregate(value_col, &bucket, agg)
                }
            })
            .collect();
        columns.push(Column::new(header.clone(), out_type, cells));
    }
    DataFrame::new(columns)
}

/// Validate that every name in `names` exists in `schema`.
pub fn check_columns(schema: &Schema, names: &[String]) -> Result<()> {
    for name in names {
        if !schema.contains(name) {
            return Err(FlowError::column_not_found(name, schema));
        }
    }
    Ok(())
}
