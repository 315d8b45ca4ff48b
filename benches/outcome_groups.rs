//! Specification grouping benchmarks.
//!
//! Measures row mapping and outcome grouping at result sizes a large
//! multiverse produces.

#![allow(missing_docs)]

use causeway::domain::models::{rows_to_specifications, RawSpecificationRow, Specification};
use causeway::services::outcome_groups::build_outcome_groups;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use serde_json::json;

fn raw_rows(count: usize) -> Vec<RawSpecificationRow> {
    (0..count)
        .map(|i| {
            let value = json!({
                "task_id": format!("task-{i}"),
                "population_name": "Adults",
                "treatment": format!("treatment_{}", i % 7),
                "outcome": format!("outcome_{}", i % 31),
                "causal_model": format!("model_{}", i % 3),
                "estimator": format!("estimator_{}", i % 4),
                "estimated_effect": ((i * 37) % 101) as f64 / 10.0 - 5.0,
                "outcome_type": if i % 5 == 0 { "Secondary" } else { "Primary" },
                "refuter_placebo_treatment": 1,
                "refuter_data_subset": 1,
                "refuter_random_common_cause": i % 2,
                "refuter_bootstrap": null,
                "refutation_result": 2,
            });
            serde_json::from_value(value).unwrap()
        })
        .collect()
}

fn bench_row_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("specifications/map_rows");

    for count in [100usize, 1_000, 10_000] {
        let rows = raw_rows(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &rows, |b, rows| {
            b.iter(|| rows_to_specifications(black_box(rows)));
        });
    }

    group.finish();
}

fn bench_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("specifications/build_outcome_groups");

    for count in [100usize, 1_000, 10_000] {
        let specs: Vec<Specification> = rows_to_specifications(&raw_rows(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &specs, |b, specs| {
            b.iter_batched(
                || specs.clone(),
                |specs| build_outcome_groups(black_box(specs)),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_row_mapping, bench_grouping);
criterion_main!(benches);
