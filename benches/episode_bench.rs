// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024-2025 Chernov Denys

//! Episode-loop benchmarks
//!
//! Measures the train and generate paths on a small learned graph:
//! - episode_train: supervised episode on a warm graph
//! - episode_generate: generation episode on a trained graph
//! - brain_save_load: persistence round trip

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bytegraph_core::ByteGraph;

fn warm_graph() -> ByteGraph {
    let mut graph = ByteGraph::new();
    for _ in 0..30 {
        graph.run_episode(b"cat", Some(b"cats")).unwrap();
    }
    graph
}

fn bench_episode_train(c: &mut Criterion) {
    let mut graph = warm_graph();
    c.bench_function("episode_train", |b| {
        b.iter(|| {
            graph
                .run_episode(black_box(b"cat"), Some(black_box(b"cats")))
                .unwrap()
        })
    });
}

fn bench_episode_generate(c: &mut Criterion) {
    let mut graph = warm_graph();
    c.bench_function("episode_generate", |b| {
        b.iter(|| graph.run_episode(black_box(b"cat"), None).unwrap())
    });
}

fn bench_brain_save_load(c: &mut Criterion) {
    let graph = warm_graph();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench-brain.txt");
    c.bench_function("brain_save_load", |b| {
        b.iter(|| {
            graph.save_brain(&path).unwrap();
            black_box(ByteGraph::load_brain(&path).unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_episode_train,
    bench_episode_generate,
    bench_brain_save_load
);
criterion_main!(benches);
