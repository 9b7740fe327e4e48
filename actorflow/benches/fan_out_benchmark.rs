//! Benchmark: actor engine overhead
//!
//! Run with:
//! ```bash
//! cargo bench --bench fan_out_benchmark
//! ```
//!
//! - chain: one vertex after another, measures per-hop routing cost
//! - fan_out: one source, N workers, one sink
//! - bounded: the fan-out shape with single-slot mailboxes

use std::collections::HashMap;

use actorflow::{BuiltWorkflow, EngineConfig, WorkflowBuilder, WorkflowExecutionContext};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// WORKFLOW SHAPES
// ============================================================================

fn chain(length: usize) -> BuiltWorkflow {
    let mut builder = WorkflowBuilder::new().with_id("chain");
    for i in 0..length {
        builder = builder.add_function_vertex(format!("step_{}", i), |input, _| async move {
            Ok(json!(input.as_i64().unwrap_or(0) + 1))
        });
        if i > 0 {
            builder = builder.add_edge(format!("step_{}", i - 1), format!("step_{}", i));
        }
    }
    builder.build().expect("chain is valid")
}

fn fan_out(width: usize, config: EngineConfig) -> BuiltWorkflow {
    let mut builder = WorkflowBuilder::new()
        .with_id("fan_out")
        .with_config(config)
        .add_function_vertex("source", |_, _| async { Ok(json!(1)) })
        .add_function_vertex("sink", |input, _| async move { Ok(input) });
    for i in 0..width {
        let id = format!("worker_{}", i);
        builder = builder
            .add_function_vertex(id.clone(), |input, _| async move { Ok(json!([input.clone(), input])) })
            .add_edge("source", id.clone())
            .add_edge(id, "sink");
    }
    builder.build().expect("fan-out is valid")
}

async fn run_once(workflow: &BuiltWorkflow) {
    let ctx = WorkflowExecutionContext::new(workflow.id());
    let report = workflow.execute(ctx, HashMap::new()).await;
    assert!(report.is_completed());
    black_box(report);
}

// ============================================================================
// BENCHMARKS
// ============================================================================

fn bench_chain(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("chain");

    for length in [2usize, 8, 32] {
        let workflow = chain(length);
        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(BenchmarkId::from_parameter(length), &workflow, |b, workflow| {
            b.to_async(&rt).iter(|| run_once(workflow));
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("fan_out");

    for width in [4usize, 16, 64] {
        let unbounded = fan_out(width, EngineConfig::default());
        let bounded = fan_out(width, EngineConfig::default().with_mailbox_capacity(1));
        group.throughput(Throughput::Elements(width as u64 + 2));

        group.bench_with_input(BenchmarkId::new("unbounded", width), &unbounded, |b, workflow| {
            b.to_async(&rt).iter(|| run_once(workflow));
        });
        group.bench_with_input(BenchmarkId::new("bounded", width), &bounded, |b, workflow| {
            b.to_async(&rt).iter(|| run_once(workflow));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain, bench_fan_out);
criterion_main!(benches);
