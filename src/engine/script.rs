//! Rhai bridge for user-authored logic.
//!
//! Two entry points: [`run_code_node`] executes a script that receives the
//! node's input frames as variables and must yield exactly one output frame,
//! and [`eval_filter_mask`] evaluates a boolean row expression where each
//! column name is in scope as the cell value of the current row.

use crate::engine::frame::{DataFrame, FrameRef};
use crate::error::{FlowError, Result};
use crate::types::Value;
use rhai::{Dynamic, Engine, Scope, AST};
use std::sync::Arc;

/// Shared frame handle exposed to scripts. Methods return new handles, so
/// scripts compose transformations without mutating inputs.
#[derive(Debug, Clone)]
pub struct FrameHandle(pub FrameRef);

impl FrameHandle {
    pub fn new(frame: DataFrame) -> Self {
        Self(Arc::new(frame))
    }

    fn num_rows(&mut self) -> i64 {
        self.0.height() as i64
    }

    fn num_columns(&mut self) -> i64 {
        self.0.width() as i64
    }

    fn column_names(&mut self) -> rhai::Array {
        self.0
            .columns()
            .iter()
            .map(|c| Dynamic::from(c.name.clone()))
            .collect()
    }

    fn head(&mut self, n: i64) -> FrameHandle {
        FrameHandle(Arc::new(self.0.head(n.max(0) as usize)))
    }

    fn select(&mut self, names: rhai::Array) -> std::result::Result<FrameHandle, Box<rhai::EvalAltResult>> {
        let mut columns = Vec::new();
        for name in names {
            let name = name.to_string();
            match self.0.column(&name) {
                Some(col) => columns.push(col.clone()),
                None => {
                    return Err(format!("unknown column '{name}'").into());
                }
            }
        }
        DataFrame::new(columns)
            .map(FrameHandle::new)
            .map_err(|e| e.to_string().into())
    }

    fn rename(&mut self, from: &str, to: &str) -> std::result::Result<FrameHandle, Box<rhai::EvalAltResult>> {
        if self.0.column(from).is_none() {
            return Err(format!("unknown column '{from}'").into());
        }
        let columns = self
            .0
            .columns()
            .iter()
            .map(|c| {
                let mut col = c.clone();
                if col.name == from {
                    col.name = to.to_string();
                }
                col
            })
            .collect();
        DataFrame::new(columns)
            .map(FrameHandle::new)
            .map_err(|e| e.to_string().into())
    }
}

fn build_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(64, 64);
    engine.set_max_call_levels(32);
    engine.set_max_operations(1_000_000);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(100_000);
    engine.set_max_map_size(10_000);

    engine.register_type_with_name::<FrameHandle>("Frame");
    engine.register_fn("num_rows", FrameHandle::num_rows);
    engine.register_fn("num_columns", FrameHandle::num_columns);
    engine.register_fn("column_names", FrameHandle::column_names);
    engine.register_fn("head", FrameHandle::head);
    engine.register_fn("select", FrameHandle::select);
    engine.register_fn("rename", FrameHandle::rename);
    engine
}

fn script_error(err: impl std::fmt::Display) -> FlowError {
    FlowError::Script(err.to_string())
}

/// Run a code node. Each `(name, frame)` pair becomes a script variable.
///
/// The output frame is resolved in order: the script's final expression if it
/// evaluates to a frame, then a conventionally named variable (`output`,
/// `output_df`, `df`, `result`), then the single frame-typed variable the
/// script introduced. Anything else is an error, since downstream nodes need
/// exactly one table.
pub fn run_code_node(inputs: &[(String, FrameRef)], code: &str) -> Result<DataFrame> {
    let engine = build_engine();
    let ast: AST = engine.compile(code).map_err(script_error)?;

    let mut scope = Scope::new();
    for (name, frame) in inputs {
        scope.push(name.clone(), FrameHandle(frame.clone()));
    }
    let input_count = scope.len();

    let outcome: Dynamic = engine
        .eval_ast_with_scope(&mut scope, &ast)
        .map_err(script_error)?;

    if let Some(handle) = outcome.try_cast::<FrameHandle>() {
        return Ok(handle.0.as_ref().clone());
    }

    for candidate in ["output", "output_df", "df", "result"] {
        if let Some(handle) = scope.get_value::<FrameHandle>(candidate) {
            if !inputs.iter().any(|(name, _)| name == candidate) {
                return Ok(handle.0.as_ref().clone());
            }
        }
    }

    // A script that introduced exactly one new frame variable is unambiguous.
    let introduced: Vec<FrameHandle> = scope
        .iter()
        .skip(input_count)
        .filter_map(|(_, _, value)| value.try_cast::<FrameHandle>())
        .collect();
    match introduced.as_slice() {
        [handle] => Ok(handle.0.as_ref().clone()),
        [] => Err(FlowError::Script(
            "script produced no output frame; assign one to `output`".into(),
        )),
        _ => Err(FlowError::Script(
            "script produced multiple candidate output frames; assign the one to keep to `output`"
                .into(),
        )),
    }
}

fn cell_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Int(v) => Dynamic::from(*v),
        Value::Float(v) => Dynamic::from(*v),
        Value::Str(s) => Dynamic::from(s.clone()),
    }
}

/// Evaluate a boolean expression once per row, with every column name bound
/// to that row's cell. Rows where the expression errors or yields a non-bool
/// fail the whole evaluation rather than being silently dropped.
pub fn eval_filter_mask(df: &DataFrame, expr: &str) -> Result<Vec<bool>> {
    let mut engine = build_engine();
    engine.set_max_operations(10_000);
    let ast: AST = engine.compile_expression(expr).map_err(script_error)?;

    let mut mask = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let mut scope = Scope::new();
        for col in df.columns() {
            scope.push_dynamic(col.name.clone(), cell_to_dynamic(&col.values[row]));
        }
        let keep: bool = engine
            .eval_ast_with_scope(&mut scope, &ast)
            .map_err(|e| FlowError::Script(format!("row {row}: {e}")))?;
        mask.push(keep);
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FrameRef {
        Arc::new(DataFrame::from_csv_str("a,b\n1,x\n2,y\n3,z\n").unwrap())
    }

    #[test]
    fn test_code_node_final_expression_is_output() {
        let out = run_code_node(&[("input".into(), frame())], "input.head(2)").unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn test_code_node_output_variable() {
        let out = run_code_node(
            &[("input".into(), frame())],
            "let output = input.select([\"b\"]); 42",
        )
        .unwrap();
        assert_eq!(out.schema().names(), vec!["b"]);
    }

    #[test]
    fn test_code_node_single_new_frame_variable() {
        let out = run_code_node(
            &[("input".into(), frame())],
            "let trimmed = input.rename(\"a\", \"id\"); ()",
        )
        .unwrap();
        assert!(out.schema().contains("id"));
    }

    #[test]
    fn test_code_node_without_output_fails() {
        let err = run_code_node(&[("input".into(), frame())], "1 + 1").unwrap_err();
        assert!(matches!(err, FlowError::Script(_)));
    }

    #[test]
    fn test_code_node_unknown_column_is_script_error() {
        let err = run_code_node(&[("input".into(), frame())], "input.select([\"nope\"])")
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_filter_mask_binds_columns() {
        let df = DataFrame::from_csv_str("a,b\n1,x\n2,y\n3,z\n").unwrap();
        let mask = eval_filter_mask(&df, "a >= 2 && b != \"y\"").unwrap();
        assert_eq!(mask, vec![false, false, true]);
    }

    #[test]
    fn test_filter_mask_non_bool_fails() {
        let df = DataFrame::from_csv_str("a\n1\n").unwrap();
        assert!(eval_filter_mask(&df, "a + 1").is_err());
    }
}
