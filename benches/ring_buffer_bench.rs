//! Ring Buffer Benchmarks — Correlation Hot-Path Performance
//!
//! Benchmarks the lookups every poll performs against a full buffer of
//! market payloads, plus the enqueue cost on the market stream.
//!
//! Run with: cargo bench --bench ring_buffer_bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use solana_sdk::pubkey::Pubkey;

use launch_sniper::domain::layout::{fixtures, market_offsets};
use launch_sniper::domain::ring_buffer::RingBuffer;
use launch_sniper::domain::swap::WSOL_MINT;

fn filled(capacity: usize) -> (RingBuffer, Vec<Pubkey>) {
    let ring = RingBuffer::with_key_offset(capacity, market_offsets::BASE_MINT);
    let mints: Vec<Pubkey> = (0..capacity).map(|_| Pubkey::new_unique()).collect();
    for mint in &mints {
        ring.enqueue(fixtures::market_bytes(&Pubkey::new_unique(), mint, &WSOL_MINT));
    }
    (ring, mints)
}

/// Newest, oldest and absent keys across buffer sizes.
fn bench_find_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_pattern");

    for capacity in [500usize, 5_000] {
        let (ring, mints) = filled(capacity);
        let newest = mints[capacity - 1];
        let oldest = mints[0];
        let absent = Pubkey::new_unique();

        group.bench_with_input(BenchmarkId::new("newest", capacity), &newest, |b, key| {
            b.iter(|| ring.find_pattern(black_box(key.as_ref())));
        });
        group.bench_with_input(BenchmarkId::new("oldest", capacity), &oldest, |b, key| {
            b.iter(|| ring.find_pattern(black_box(key.as_ref())));
        });
        group.bench_with_input(BenchmarkId::new("absent", capacity), &absent, |b, key| {
            b.iter(|| ring.find_pattern(black_box(key.as_ref())));
        });
    }

    group.finish();
}

/// Enqueue into a full buffer (steady-state eviction).
fn bench_enqueue(c: &mut Criterion) {
    let (ring, _) = filled(5_000);
    let payload = fixtures::market_bytes(&Pubkey::new_unique(), &Pubkey::new_unique(), &WSOL_MINT);

    c.bench_function("enqueue_full_5000", |b| {
        b.iter(|| ring.enqueue(black_box(payload.clone())));
    });
}

criterion_group!(benches, bench_find_pattern, bench_enqueue);
criterion_main!(benches);
