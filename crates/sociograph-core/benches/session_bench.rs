//! # Session Benchmarks
//!
//! Throughput of action submission, undo/redo and exports.
//!
//! Run with: `cargo bench -p sociograph-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sociograph_core::{
    Action, ActionContext, ActionStack, AttrValue, Attributes, Edge, Graph, NodeId, TrainingInput,
    formats::{CheckpointFormat, state_to_bytes},
};
use std::hint::black_box;

fn attrs(i: usize) -> Attributes {
    let mut a = Attributes::new();
    a.insert("age".to_string(), AttrValue::Int(i as i64 % 12));
    a.insert(
        "sex".to_string(),
        AttrValue::from(if i % 2 == 0 { "f" } else { "m" }),
    );
    a
}

/// Path graph of `size` nodes with every fourth node left hanging.
fn create_path_graph(size: usize) -> Graph {
    let mut graph = Graph::new();
    let nodes = (0..size)
        .map(|i| (NodeId::new(format!("n{}", i)), attrs(i)))
        .collect();
    graph.add_nodes(nodes).expect("nodes");
    let edges = (1..size)
        .filter(|i| i % 4 != 0)
        .map(|i| Edge::new(format!("n{}", i - 1), format!("n{}", i)))
        .collect();
    graph.add_edges(edges).expect("edges");
    graph.deselect();
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_submit_nodes(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_add_node");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut graph = Graph::new();
                let mut stack = ActionStack::new();
                let mut ctx = ActionContext::graph_only(&mut graph);
                for i in 0..size {
                    let _ = stack.submit(Action::add_node(format!("n{}", i), attrs(i)), &mut ctx);
                }
                black_box(stack.undo_depth())
            });
        });
    }

    group.finish();
}

fn bench_undo_redo_removal(c: &mut Criterion) {
    let mut group = c.benchmark_group("undo_redo_remove_hub");

    for size in [100, 1000].iter() {
        let mut graph = create_path_graph(*size);
        let mut stack = ActionStack::new();
        let mut ctx = ActionContext::graph_only(&mut graph);
        stack
            .submit(Action::remove_nodes(vec![NodeId::new("n1")]), &mut ctx)
            .expect("remove");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                stack.undo(&mut ctx).expect("undo");
                stack.redo(&mut ctx).expect("redo");
            });
        });
    }

    group.finish();
}

fn bench_training_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("training_input");

    for size in [100, 1000].iter() {
        let graph = create_path_graph(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(TrainingInput::from_graph(&graph)));
        });
    }

    group.finish();
}

fn bench_checkpoint_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint_encode");

    for size in [100, 1000].iter() {
        let graph = create_path_graph(*size);
        for format in [CheckpointFormat::Binary, CheckpointFormat::Json] {
            group.bench_with_input(BenchmarkId::new(format.to_string(), size), size, |b, _| {
                b.iter(|| black_box(state_to_bytes(graph.state(), format)));
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_nodes,
    bench_undo_redo_removal,
    bench_training_export,
    bench_checkpoint_encode
);
criterion_main!(benches);
