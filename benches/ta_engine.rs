//! Streaming TA engine throughput: each indicator claims O(1)-amortized
//! per-update cost (SPEC_FULL §4.6). These benches exercise that claim at
//! growing bar counts, plus the reshuffle path a length change forces.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pinescript::ta::{ExtremaState, SmaState, WmaState};

fn synthetic_series(n: usize) -> Vec<f64> {
    let mut values = Vec::with_capacity(n);
    let mut seed = 2024u64;
    let mut price = 100.0;
    for _ in 0..n {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        price += ((seed >> 33) as f64 / u32::MAX as f64) - 0.5;
        values.push(price);
    }
    values
}

fn bench_sma_fixed_length(c: &mut Criterion) {
    let series = synthetic_series(10_000);
    let mut group = c.benchmark_group("sma_fixed_length");
    group.bench_function("10k_bars_length_20", |b| {
        b.iter(|| {
            let mut s = SmaState::default();
            for &v in &series {
                black_box(s.update(v, 20));
            }
        })
    });
    group.finish();
}

fn bench_wma_fixed_length(c: &mut Criterion) {
    let series = synthetic_series(10_000);
    let mut group = c.benchmark_group("wma_fixed_length");
    group.bench_function("10k_bars_length_20", |b| {
        b.iter(|| {
            let mut s = WmaState::default();
            for &v in &series {
                black_box(s.update(v, 20));
            }
        })
    });
    group.finish();
}

fn bench_extrema_fixed_length(c: &mut Criterion) {
    let series = synthetic_series(10_000);
    let mut group = c.benchmark_group("extrema_fixed_length");
    group.bench_function("10k_bars_length_20", |b| {
        b.iter(|| {
            let mut s = ExtremaState::default();
            for &v in &series {
                black_box(s.update(v, 20));
            }
        })
    });
    group.finish();
}

/// A length that changes every bar forces SMA/WMA/extrema onto their O(N)
/// rebuild path continuously — the worst case the dynamic-length
/// discipline is meant to bound, not amortize away.
fn bench_sma_churning_length(c: &mut Criterion) {
    let series = synthetic_series(2_000);
    let mut group = c.benchmark_group("sma_churning_length");
    group.bench_function("2k_bars_length_2_to_45", |b| {
        b.iter(|| {
            let mut s = SmaState::default();
            for (i, &v) in series.iter().enumerate() {
                let length = 2 + (i as i64 % 44);
                black_box(s.update(v, length));
            }
        })
    });
    group.finish();
}

fn bench_extrema_churning_length(c: &mut Criterion) {
    let series = synthetic_series(2_000);
    let mut group = c.benchmark_group("extrema_churning_length");
    group.bench_function("2k_bars_length_2_to_45", |b| {
        b.iter(|| {
            let mut s = ExtremaState::default();
            for (i, &v) in series.iter().enumerate() {
                let length = 2 + (i as i64 % 44);
                black_box(s.update(v, length));
            }
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sma_fixed_length,
    bench_wma_fixed_length,
    bench_extrema_fixed_length,
    bench_sma_churning_length,
    bench_extrema_churning_length,
);
criterion_main!(benches);
