//! Benchmarks for plan evaluation over growing row counts.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowframe::engine::frame::{Column, DataFrame};
use flowframe::engine::plan::{
    AggSpec, Aggregation, CompareOp, JoinHow, JoinSuffixes, LazyPlan, Predicate, SortKey,
};
use flowframe::engine::{collect, pivot};
use flowframe::types::{DataType, Value};

fn synthetic_frame(rows: usize) -> DataFrame {
    let keys: Vec<Value> = (0..rows)
        .map(|i| Value::Str(format!("key_{}", i % 100)))
        .collect();
    let ints: Vec<Value> = (0..rows).map(|i| Value::Int((i % 1000) as i64)).collect();
    let floats: Vec<Value> = (0..rows).map(|i| Value::Float(i as f64 * 0.5)).collect();
    DataFrame::new(vec![
        Column::new("k", DataType::String, keys),
        Column::new("v", DataType::Int64, ints),
        Column::new("f", DataType::Float64, floats),
    ])
    .unwrap()
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    for rows in [1_000usize, 10_000, 100_000] {
        let plan = LazyPlan::from_frame(synthetic_frame(rows), "bench").filter(
            Predicate::Compare {
                column: "v".into(),
                op: CompareOp::Lt,
                value: Value::Int(500),
            },
        );
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &plan, |b, plan| {
            b.iter(|| black_box(collect(plan).unwrap()))
        });
    }
    group.finish();
}

fn bench_group_by(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by");
    for rows in [1_000usize, 10_000, 100_000] {
        let plan = LazyPlan::from_frame(synthetic_frame(rows), "bench").group_by(
            vec!["k".into()],
            vec![
                AggSpec {
                    column: "v".into(),
                    agg: Aggregation::Sum,
                    alias: "v_sum".into(),
                },
                AggSpec {
                    column: "f".into(),
                    agg: Aggregation::Mean,
                    alias: "f_mean".into(),
                },
            ],
        );
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &plan, |b, plan| {
            b.iter(|| black_box(collect(plan).unwrap()))
        });
    }
    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("inner_join");
    for rows in [1_000usize, 10_000] {
        let left = LazyPlan::from_frame(synthetic_frame(rows), "left");
        let right = LazyPlan::from_frame(synthetic_frame(rows / 2), "right");
        let plan = left.join(
            right,
            JoinHow::Inner,
            vec!["v".into()],
            vec!["v".into()],
            JoinSuffixes::default(),
        );
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &plan, |b, plan| {
            b.iter(|| black_box(collect(plan).unwrap()))
        });
    }
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");
    for rows in [1_000usize, 10_000, 100_000] {
        let plan = LazyPlan::from_frame(synthetic_frame(rows), "bench").sort(vec![
            SortKey {
                column: "k".into(),
                descending: false,
            },
            SortKey {
                column: "f".into(),
                descending: true,
            },
        ]);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &plan, |b, plan| {
            b.iter(|| black_box(collect(plan).unwrap()))
        });
    }
    group.finish();
}

fn bench_pivot(c: &mut Criterion) {
    let mut group = c.benchmark_group("pivot");
    for rows in [1_000usize, 10_000] {
        let frame = synthetic_frame(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &frame, |b, frame| {
            b.iter(|| {
                black_box(
                    pivot(frame, &["k".to_string()], "v", "f", Aggregation::Mean).unwrap(),
                )
            })
        });
    }
    group.finish();
}

fn bench_identity_hash(c: &mut Criterion) {
    let plan = LazyPlan::from_frame(synthetic_frame(10_000), "bench")
        .filter(Predicate::Compare {
            column: "v".into(),
            op: CompareOp::GtEq,
            value: Value::Int(100),
        })
        .group_by(
            vec!["k".into()],
            vec![AggSpec {
                column: "f".into(),
                agg: Aggregation::Max,
                alias: "f_max".into(),
            }],
        );
    c.bench_function("identity_hash", |b| {
        b.iter(|| black_box(plan.identity_hash()))
    });
}

criterion_group!(
    benches,
    bench_filter,
    bench_group_by,
    bench_join,
    bench_sort,
    bench_pivot,
    bench_identity_hash
);
criterion_main!(benches);
