//! Criterion benchmarks for the request-path data structures
//!
//! The set-trie query and the dominator fixed point run once per search, so
//! they are the structures worth watching for regressions.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use groum_search::graph::GraphBuilder;
use groum_search::{Acdfg, Dominators, SetTrie};

/// Deterministic pseudo-random sets mimicking cluster method vocabularies
fn generate_sets(count: usize, vocab: u32) -> Vec<Vec<u32>> {
    let mut rng_state = 12345_u64; // Simple LCG for reproducibility
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        rng_state = rng_state.wrapping_mul(1103515245).wrapping_add(12345);
        let len = 2 + (rng_state % 6) as usize;
        let mut set = Vec::with_capacity(len);
        for _ in 0..len {
            rng_state = rng_state.wrapping_mul(1103515245).wrapping_add(12345);
            set.push((rng_state % u64::from(vocab)) as u32);
        }
        set.sort_unstable();
        set.dedup();
        sets.push(set);
    }
    sets
}

fn bench_set_trie(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_trie");

    for size in [100, 1000, 5000] {
        let sets = generate_sets(size, 200);
        let mut trie = SetTrie::new();
        for (i, set) in sets.iter().enumerate() {
            trie.insert(set, i);
        }

        group.bench_with_input(BenchmarkId::new("supersets", size), &trie, |b, trie| {
            b.iter(|| {
                let hits = trie.supersets(black_box(&[3, 17]));
                black_box(hits);
            });
        });
    }

    group.finish();
}

/// Control graph shaped like a method body: a chain of diamonds with a loop
fn diamond_chain(diamonds: u64) -> Acdfg {
    let mut b = GraphBuilder::new();
    let mut edge = 10_000u64;
    let mut prev = 1u64;
    b.method_node(prev, None, None, "entry", &[]);
    for d in 0..diamonds {
        let base = 2 + d * 3;
        for id in base..base + 3 {
            b.method_node(id, None, None, "m", &[]);
        }
        b.control_edge(edge, prev, base);
        b.control_edge(edge + 1, prev, base + 1);
        b.control_edge(edge + 2, base, base + 2);
        b.control_edge(edge + 3, base + 1, base + 2);
        edge += 4;
        prev = base + 2;
    }
    // Back edge to make the fixed point iterate
    b.control_edge(edge, prev, 1);
    b.build().unwrap()
}

fn bench_dominators(c: &mut Criterion) {
    let mut group = c.benchmark_group("dominators");

    for diamonds in [10, 50, 200] {
        let graph = diamond_chain(diamonds);
        group.bench_with_input(
            BenchmarkId::new("compute", diamonds),
            &graph,
            |b, graph| {
                b.iter(|| {
                    let root = graph
                        .effective_control_roots()
                        .first()
                        .copied()
                        .expect("graph has control nodes");
                    let dom = Dominators::compute(black_box(graph), root);
                    black_box(dom.natural_loops());
                });
            },
        );
    }

    group.finish();
}

fn bench_wire_decode(c: &mut Criterion) {
    let graph = diamond_chain(100);
    let bytes = graph.to_bytes();
    c.bench_function("graph_decode", |b| {
        b.iter(|| {
            let g = Acdfg::from_bytes(black_box(&bytes)).expect("valid message");
            black_box(g);
        });
    });
}

criterion_group!(benches, bench_set_trie, bench_dominators, bench_wire_decode);
criterion_main!(benches);
