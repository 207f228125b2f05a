//! Benchmarks for keyed children reconciliation.

use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::render::{
    longest_increasing_subsequence, DiffStrategy, Renderer, RendererConfig, TestHost, VNode,
};

fn list(keys: &[usize]) -> VNode {
    VNode::element("ul").children(
        keys.iter()
            .map(|&key| VNode::element("li").key(key).child_text(key.to_string()))
            .collect(),
    )
}

/// Reverse the list and swap neighbours in the middle third.
fn shuffled(n: usize) -> Vec<usize> {
    let mut keys: Vec<usize> = (0..n).rev().collect();
    for pair in keys[n / 3..2 * n / 3].chunks_mut(2) {
        pair.reverse();
    }
    keys
}

/// Longest increasing subsequence over a scrambled source map.
fn bench_lis(c: &mut Criterion) {
    let mut group = c.benchmark_group("lis");

    for n in [100, 1000, 10_000] {
        let seq: Vec<Option<usize>> = (0..n)
            .map(|i| if i % 7 == 0 { None } else { Some((i * 7919) % n) })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &seq, |b, seq| {
            b.iter(|| longest_increasing_subsequence(black_box(seq.as_slice())));
        });
    }

    group.finish();
}

/// Patch a mounted keyed list into a shuffled order and back.
fn bench_keyed_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_patch");

    for n in [10, 100, 1000] {
        let forward: Vec<usize> = (0..n).collect();
        let scrambled = shuffled(n);

        for strategy in [DiffStrategy::Simple, DiffStrategy::DoubleEnded, DiffStrategy::Fast] {
            let id = BenchmarkId::new(format!("{strategy:?}"), n);
            group.bench_with_input(id, &n, |b, _| {
                let host = Rc::new(TestHost::new());
                let renderer = Renderer::new(host.clone(), RendererConfig::with_diff(strategy));
                let root = host.create_root("app");
                renderer.render(Some(list(&forward)), root);

                b.iter(|| {
                    renderer.render(Some(list(&scrambled)), root);
                    renderer.render(Some(list(&forward)), root);
                    host.clear_ops();
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_lis, bench_keyed_patch);
criterion_main!(benches);
