//! Criterion benchmarks for the data hot paths.
//!
//! Benchmarks:
//! 1. Multi-symbol alignment with forward-fill
//! 2. Replay drip-feed with window queries
//! 3. CSV cache round trip

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use barfeed_core::data::{align_symbols, ActiveUniverse, AlignBounds, CsvCache};
use barfeed_core::domain::{event_queue, BarRecord, Frequency, SymbolSeries};
use barfeed_core::source::{MarketDataSource, ReplayFeed};

// ── Helpers ──────────────────────────────────────────────────────────

/// `n` daily bars; every `gap_every`-th day is missing to exercise forward-fill.
fn make_series(symbol: &str, n: usize, gap_every: usize) -> SymbolSeries {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let bars = (0..n)
        .filter(|i| gap_every == 0 || i % gap_every != 0)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            BarRecord {
                symbol: symbol.to_string(),
                timestamp: base + chrono::Duration::days(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000.0 + (i % 500) as f64,
            }
        })
        .collect();
    SymbolSeries::new(symbol, bars)
}

fn make_universe(bars: usize, symbols: usize) -> Vec<SymbolSeries> {
    (0..symbols)
        .map(|i| make_series(&format!("SYM{i}"), bars, i + 2))
        .collect()
}

// ── 1. Alignment ─────────────────────────────────────────────────────

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align_symbols");

    for &bar_count in &[252, 1260, 2520] {
        let input = make_universe(bar_count, 10);
        group.bench_with_input(
            BenchmarkId::new("10_symbols", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| align_symbols(black_box(input.clone()), &AlignBounds::unbounded()));
            },
        );
    }

    group.finish();
}

// ── 2. Replay ────────────────────────────────────────────────────────

fn bench_replay(c: &mut Criterion) {
    let data = align_symbols(make_universe(1260, 10), &AlignBounds::unbounded()).data;

    c.bench_function("replay_10_symbols_1260_ticks", |b| {
        b.iter(|| {
            let universe = ActiveUniverse::new(data.symbols());
            let (tx, rx) = event_queue();
            let mut feed = ReplayFeed::new(universe, data.clone(), tx);
            while feed.continue_run() {
                feed.advance().unwrap();
                black_box(feed.latest_bars("SYM0", 50).unwrap());
            }
            drop(rx);
        });
    });
}

// ── 3. CSV Cache ─────────────────────────────────────────────────────

fn bench_cache(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let cache = CsvCache::new(dir.path());
    let series = make_series("BENCH", 2520, 0);

    c.bench_function("cache_save_load_2520", |b| {
        b.iter(|| {
            cache.save("BENCH", Frequency::Daily, black_box(&series)).unwrap();
            black_box(cache.load("BENCH", Frequency::Daily).unwrap());
        });
    });
}

criterion_group!(benches, bench_align, bench_replay, bench_cache);
criterion_main!(benches);
