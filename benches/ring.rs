//! Benchmarks for next-player selection and whole games
//!
//! Run with: cargo bench --bench ring

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hot_potato::network::codec::{decode_message, encode_message};
use hot_potato::{next_player, Flag, GameBuilder, GameMessage, PeerId, PlayingSet};
use std::hint::black_box;

/// A ring of `n` peers where only every `stride`-th peer is still playing.
fn sparse_ring(n: usize, stride: usize) -> PlayingSet {
    let mut playing = PlayingSet::new(n);
    for id in 0..n {
        if id % stride != 0 {
            playing.eliminate(PeerId::new(id));
        }
    }
    playing
}

fn bench_next_player(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_player");

    for &n in &[8usize, 64, 1024] {
        let full = PlayingSet::new(n);
        group.bench_with_input(BenchmarkId::new("full", n), &full, |b, playing| {
            b.iter(|| next_player(black_box(PeerId::new(n / 2)), black_box(playing)))
        });

        // Worst case: one other survivor on the far side of the ring.
        let sparse = sparse_ring(n, n / 2);
        group.bench_with_input(BenchmarkId::new("sparse", n), &sparse, |b, playing| {
            b.iter(|| next_player(black_box(PeerId::new(1)), black_box(playing)))
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let msg = GameMessage::new(PeerId::new(3), 42, PeerId::new(4), Flag::Continue);
    let bytes = encode_message(&msg).unwrap_or([0; 16]);

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));
    group.bench_function("encode", |b| b.iter(|| encode_message(black_box(&msg))));
    group.bench_function("decode", |b| b.iter(|| decode_message(black_box(&bytes))));
    group.finish();
}

fn bench_game(c: &mut Criterion) {
    let mut group = c.benchmark_group("game");
    group.sample_size(20);

    for &peers in &[2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("peers", peers), &peers, |b, &peers| {
            b.iter(|| {
                GameBuilder::new()
                    .with_num_peers(peers)
                    .and_then(|builder| builder.with_initial_token(50))
                    .and_then(|builder| builder.with_max_decrement(10))
                    .map(|builder| builder.with_seed(1).start_game())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_next_player, bench_codec, bench_game);
criterion_main!(benches);
