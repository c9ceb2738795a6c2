//! End-to-end flow execution tests.
//!
//! These drive complete flows through [`FlowRunner`]: reading CSV files
//! from disk, transforming through multiple node kinds, writing outputs,
//! and checking previews and schemas along the way.

use flowframe::engine::frame::DataFrame;
use flowframe::engine::plan::{
    AggSpec, Aggregation, CompareOp, JoinHow, JoinSuffixes, Predicate,
};
use flowframe::flow::{FlowRunner, InputSlot, NodeId, NodeKind, NodeSettings};
use flowframe::types::{DataType, Schema, Value};
use flowframe::flow::settings::{
    FilterSettings, GroupBySettings, JoinSettings, OutputSettings, PivotSettings, ReadSettings,
    SelectEntry, SelectSettings,
};
use std::io::Write;

fn csv_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_read_select_preview() {
    let dir = tempfile::tempdir().unwrap();
    let path = csv_file(&dir, "input.csv", "a,b\n1,x\n2,y\n");

    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner
        .update_settings(NodeId(1), NodeSettings::Read(ReadSettings { path }))
        .unwrap();
    runner.add_node_of_kind(NodeId(2), NodeKind::Select).unwrap();
    runner.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(2),
            NodeSettings::Select(SelectSettings {
                columns: vec![
                    SelectEntry {
                        name: "a".into(),
                        new_name: None,
                        keep: false,
                        position: None,
                    },
                    SelectEntry {
                        name: "b".into(),
                        new_name: None,
                        keep: true,
                        position: None,
                    },
                ],
            }),
        )
        .unwrap();

    let report = runner.run().unwrap();
    assert_eq!(report.failed, 0);

    let preview = runner.fetch_preview(NodeId(2), 100, false).unwrap();
    assert_eq!(
        preview.schema,
        Schema::from_pairs(vec![("b", DataType::String)])
    );
    assert_eq!(preview.rows[0], vec![Value::Str("x".into())]);
    assert_eq!(preview.rows[1], vec![Value::Str("y".into())]);
}

#[test]
fn test_filter_group_sort_pipeline() {
    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner.attach_content(
        NodeId(1),
        DataFrame::from_csv_str("k,v\na,1\nb,10\na,3\nb,20\nc,100\n").unwrap(),
    );
    runner.add_node_of_kind(NodeId(2), NodeKind::Filter).unwrap();
    runner.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(2),
            NodeSettings::Filter(FilterSettings {
                predicate: Some(Predicate::Compare {
                    column: "v".into(),
                    op: CompareOp::Lt,
                    value: Value::Int(100),
                }),
            }),
        )
        .unwrap();
    runner.add_node_of_kind(NodeId(3), NodeKind::GroupBy).unwrap();
    runner.add_edge(NodeId(2), NodeId(3), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(3),
            NodeSettings::GroupBy(GroupBySettings {
                keys: vec!["k".into()],
                aggregations: vec![AggSpec {
                    column: "v".into(),
                    agg: Aggregation::Sum,
                    alias: "v_sum".into(),
                }],
            }),
        )
        .unwrap();

    runner.run().unwrap();
    let preview = runner.fetch_preview(NodeId(3), 100, false).unwrap();
    assert_eq!(
        preview.schema,
        Schema::from_pairs(vec![("k", DataType::String), ("v_sum", DataType::Int64)])
    );
    assert_eq!(preview.total_rows, 2);
    assert_eq!(preview.rows[0], vec![Value::Str("a".into()), Value::Int(4)]);
    assert_eq!(preview.rows[1], vec![Value::Str("b".into()), Value::Int(30)]);
}

#[test]
fn test_join_renames_colliding_columns() {
    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner.attach_content(
        NodeId(1),
        DataFrame::from_csv_str("id,x\n1,10\n2,20\n").unwrap(),
    );
    runner.add_node_of_kind(NodeId(2), NodeKind::Read).unwrap();
    runner.attach_content(
        NodeId(2),
        DataFrame::from_csv_str("id,x\n1,11\n3,33\n").unwrap(),
    );
    runner.add_node_of_kind(NodeId(3), NodeKind::Join).unwrap();
    runner.add_edge(NodeId(1), NodeId(3), InputSlot::Default).unwrap();
    runner.add_edge(NodeId(2), NodeId(3), InputSlot::Right).unwrap();
    runner
        .update_settings(
            NodeId(3),
            NodeSettings::Join(JoinSettings {
                how: JoinHow::Inner,
                left_on: vec!["id".into()],
                right_on: vec!["id".into()],
                suffixes: JoinSuffixes::default(),
            }),
        )
        .unwrap();

    runner.run().unwrap();
    let preview = runner.fetch_preview(NodeId(3), 100, false).unwrap();
    assert_eq!(preview.schema.names(), vec!["id", "x_left", "x_right"]);
    assert_eq!(preview.total_rows, 1);
    assert_eq!(
        preview.rows[0],
        vec![Value::Int(1), Value::Int(10), Value::Int(11)]
    );
}

#[test]
fn test_semi_join_keeps_left_schema() {
    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner.attach_content(
        NodeId(1),
        DataFrame::from_csv_str("id,x\n1,10\n2,20\n").unwrap(),
    );
    runner.add_node_of_kind(NodeId(2), NodeKind::Read).unwrap();
    runner.attach_content(NodeId(2), DataFrame::from_csv_str("id,y\n2,b\n").unwrap());
    runner.add_node_of_kind(NodeId(3), NodeKind::Join).unwrap();
    runner.add_edge(NodeId(1), NodeId(3), InputSlot::Default).unwrap();
    runner.add_edge(NodeId(2), NodeId(3), InputSlot::Right).unwrap();
    runner
        .update_settings(
            NodeId(3),
            NodeSettings::Join(JoinSettings {
                how: JoinHow::Semi,
                left_on: vec!["id".into()],
                right_on: vec!["id".into()],
                suffixes: JoinSuffixes::default(),
            }),
        )
        .unwrap();

    runner.run().unwrap();
    let preview = runner.fetch_preview(NodeId(3), 100, false).unwrap();
    assert_eq!(
        preview.schema,
        Schema::from_pairs(vec![("id", DataType::Int64), ("x", DataType::Int64)])
    );
    assert_eq!(preview.total_rows, 1);
    assert_eq!(preview.rows[0][0], Value::Int(2));
}

#[test]
fn test_output_node_writes_csv() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("result.csv");

    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner.attach_content(
        NodeId(1),
        DataFrame::from_csv_str("a,b\n2,y\n1,x\n").unwrap(),
    );
    runner.add_node_of_kind(NodeId(2), NodeKind::Sort).unwrap();
    runner.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(2),
            NodeSettings::Sort(flowframe::flow::settings::SortSettings {
                by: vec![flowframe::engine::plan::SortKey {
                    column: "a".into(),
                    descending: false,
                }],
            }),
        )
        .unwrap();
    runner.add_node_of_kind(NodeId(3), NodeKind::Output).unwrap();
    runner.add_edge(NodeId(2), NodeId(3), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(3),
            NodeSettings::Output(OutputSettings {
                path: out_path.to_string_lossy().into_owned(),
            }),
        )
        .unwrap();

    let report = runner.run().unwrap();
    assert_eq!(report.failed, 0);

    let written = DataFrame::from_csv_path(&out_path).unwrap();
    assert_eq!(written.column("a").unwrap().values, vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_pivot_through_runner_has_exact_schema() {
    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner.attach_content(
        NodeId(1),
        DataFrame::from_csv_str(
            "region,product,amount\nnorth,apple,10\nnorth,pear,5\nsouth,apple,20\n",
        )
        .unwrap(),
    );
    runner.add_node_of_kind(NodeId(2), NodeKind::Pivot).unwrap();
    runner.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(2),
            NodeSettings::Pivot(PivotSettings {
                index: vec!["region".into()],
                on: "product".into(),
                values: "amount".into(),
                agg: Aggregation::Sum,
            }),
        )
        .unwrap();

    runner.run().unwrap();
    // Pivot infers Unknown before a run but registers an exact schema after.
    let schemas = runner.inferred_schemas().unwrap();
    assert_eq!(
        schemas[&NodeId(2)].known().unwrap().names(),
        vec!["region", "apple", "pear"]
    );
}

#[test]
fn test_code_node_end_to_end() {
    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner.attach_content(
        NodeId(1),
        DataFrame::from_csv_str("a,b\n1,x\n2,y\n3,z\n").unwrap(),
    );
    runner
        .add_node_of_kind(NodeId(2), NodeKind::ExpressionCode)
        .unwrap();
    runner.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(2),
            NodeSettings::ExpressionCode(flowframe::flow::settings::ExpressionSettings {
                code: "let output = input.head(2).rename(\"a\", \"id\"); output".into(),
            }),
        )
        .unwrap();

    let report = runner.run().unwrap();
    assert_eq!(report.failed, 0);
    let preview = runner.fetch_preview(NodeId(2), 100, false).unwrap();
    assert_eq!(preview.schema.names(), vec!["id", "b"]);
    assert_eq!(preview.total_rows, 2);
}

#[test]
fn test_script_failure_recorded_not_raised() {
    let mut runner = FlowRunner::default();
    runner.add_node_of_kind(NodeId(1), NodeKind::Read).unwrap();
    runner.attach_content(NodeId(1), DataFrame::from_csv_str("a\n1\n").unwrap());
    runner
        .add_node_of_kind(NodeId(2), NodeKind::ExpressionCode)
        .unwrap();
    runner.add_edge(NodeId(1), NodeId(2), InputSlot::Default).unwrap();
    runner
        .update_settings(
            NodeId(2),
            NodeSettings::ExpressionCode(flowframe::flow::settings::ExpressionSettings {
                code: "this is not rhai (".into(),
            }),
        )
        .unwrap();

    let report = runner.run().unwrap();
    assert_eq!(report.failed, 1);
    assert!(!runner.node_result(NodeId(2)).unwrap().success);
}
