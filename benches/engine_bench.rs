#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stratalog::{AggregationFunction, Algorithm, NumberDomain, Predicate, ProgramBuilder, Variable};

struct Graph {
    builder: ProgramBuilder<i64>,
    edge: Predicate,
    path: Predicate,
}

fn variables(builder: &mut ProgramBuilder<i64>) -> (Variable, Variable, Variable) {
    (builder.variable(), builder.variable(), builder.variable())
}

/// Edges as facts, plus path(x, y) :- edge(x, y).
fn setup_graph(algorithm: Algorithm, edges: impl IntoIterator<Item = [i64; 2]>) -> Graph {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut builder = ProgramBuilder::with_algorithm(algorithm);
    let edge = builder.predicate();
    let path = builder.predicate();
    let (x, y, _) = variables(&mut builder);

    builder.facts(edge, 2, edges).unwrap();
    builder
        .rule(path, vec![x.into(), y.into()], |body| {
            body.literal(edge, vec![x.into(), y.into()], false);
        })
        .unwrap();
    Graph {
        builder,
        edge,
        path,
    }
}

/// path(x, z) :- path(x, y), edge(y, z).
fn add_recursion(graph: &mut Graph) {
    let (edge, path) = (graph.edge, graph.path);
    let (x, y, z) = variables(&mut graph.builder);
    graph
        .builder
        .rule(path, vec![x.into(), z.into()], |body| {
            body.literal(path, vec![x.into(), y.into()], false)
                .literal(edge, vec![y.into(), z.into()], false);
        })
        .unwrap();
}

fn chain(length: i64) -> impl Iterator<Item = [i64; 2]> {
    (0..length).map(|i| [i, i + 1])
}

/// Benchmark for loading facts into a builder
fn bench_add_facts(c: &mut Criterion) {
    c.bench_function("add_facts", |b| {
        b.iter(|| {
            let mut builder = ProgramBuilder::<i64>::new();
            let edge = builder.predicate();
            for i in 0..1000 {
                builder.fact(edge, black_box([i, i + 1])).unwrap();
            }
            black_box(builder)
        });
    });
}

/// Benchmark for bulk loading the same facts
fn bench_bulk_facts(c: &mut Criterion) {
    c.bench_function("bulk_facts", |b| {
        b.iter(|| {
            let mut builder = ProgramBuilder::<i64>::new();
            let edge = builder.predicate();
            builder.facts(edge, 2, chain(black_box(1000))).unwrap();
            black_box(builder)
        });
    });
}

/// Benchmark for a single non-recursive rule
fn bench_simple_rule_evaluation(c: &mut Criterion) {
    let graph = setup_graph(Algorithm::SemiNaive, chain(100));
    let path = graph.path;
    let program = graph.builder.build(NumberDomain);

    c.bench_function("simple_rule_evaluation", |b| {
        b.iter(|| black_box(program.solve(path, 2).unwrap()));
    });
}

/// Transitive closure of a chain, the worst case for naive evaluation
fn bench_transitive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_closure");
    for algorithm in [Algorithm::Naive, Algorithm::SemiNaive] {
        let mut graph = setup_graph(algorithm, chain(50));
        add_recursion(&mut graph);
        let path = graph.path;
        let program = graph.builder.build(NumberDomain);

        group.bench_function(algorithm.to_string(), |b| {
            b.iter(|| black_box(program.solve(path, 2).unwrap()));
        });
    }
    group.finish();
}

/// Pairs of nodes with no path between them, on a cyclic graph
fn bench_negation(c: &mut Criterion) {
    let edges = (0..30).flat_map(|i| (1..3).map(move |j| [i, (i + j * 7) % 40]));
    let mut graph = setup_graph(Algorithm::SemiNaive, edges);
    add_recursion(&mut graph);

    let path = graph.path;
    let node = graph.builder.predicate();
    let unreachable = graph.builder.predicate();
    let (x, y, _) = variables(&mut graph.builder);
    graph.builder.facts(node, 1, (0..40).map(|i| [i])).unwrap();
    graph
        .builder
        .rule(unreachable, vec![x.into(), y.into()], |body| {
            body.literal(node, vec![x.into()], false)
                .literal(node, vec![y.into()], false)
                .literal(path, vec![x.into(), y.into()], true);
        })
        .unwrap();
    let program = graph.builder.build(NumberDomain);

    c.bench_function("negation", |b| {
        b.iter(|| black_box(program.solve(unreachable, 2).unwrap()));
    });
}

/// Out-degree of every node, then the largest one
fn bench_aggregation(c: &mut Criterion) {
    let edges = (0..200).flat_map(|i| (1..=i % 7).map(move |j| [i, i + j]));
    let mut graph = setup_graph(Algorithm::SemiNaive, edges);

    let edge = graph.edge;
    let degree = graph.builder.predicate();
    let largest = graph.builder.predicate();
    let (x, y, d) = variables(&mut graph.builder);
    let m = graph.builder.variable();
    graph
        .builder
        .rule(degree, vec![x.into(), d.into()], |body| {
            body.literal(edge, vec![x.into(), y.into()], false)
                .aggregate(AggregationFunction::Count, [x], [y], d);
        })
        .unwrap()
        .rule(largest, vec![m.into()], |body| {
            body.literal(degree, vec![x.into(), d.into()], false)
                .aggregate(AggregationFunction::Max, [], [d], m);
        })
        .unwrap();
    let program = graph.builder.build(NumberDomain);

    c.bench_function("aggregation", |b| {
        b.iter(|| black_box(program.solve(largest, 1).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_add_facts,
    bench_bulk_facts,
    bench_simple_rule_evaluation,
    bench_transitive_closure,
    bench_negation,
    bench_aggregation
);
criterion_main!(benches);
