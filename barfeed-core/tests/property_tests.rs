//! Property tests for alignment and replay invariants.
//!
//! Uses proptest to verify:
//! 1. Rectangularity: every aligned series has one bar per index entry
//! 2. Idempotence: aligning aligned data changes nothing
//! 3. Merge: timestamps stay strictly increasing and fresh bars win
//! 4. Windows: never longer than `n` or the number of ticks advanced

use barfeed_core::data::{align_symbols, AlignBounds, ActiveUniverse};
use barfeed_core::domain::{event_queue, BarRecord, SymbolSeries};
use barfeed_core::source::{MarketDataSource, ReplayFeed};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn day(offset: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(i64::from(offset))
}

fn make_series(symbol: &str, offsets: &BTreeSet<u32>, base: f64) -> SymbolSeries {
    let bars = offsets
        .iter()
        .map(|&o| BarRecord {
            symbol: symbol.into(),
            timestamp: day(o),
            open: base + o as f64,
            high: base + o as f64 + 1.0,
            low: base + o as f64 - 1.0,
            close: base + o as f64 + 0.5,
            volume: 100.0,
        })
        .collect();
    SymbolSeries::new(symbol, bars)
}

fn arb_offsets() -> impl Strategy<Value = BTreeSet<u32>> {
    prop::collection::btree_set(0u32..90, 1..30)
}

fn arb_universe() -> impl Strategy<Value = Vec<SymbolSeries>> {
    prop::collection::vec(arb_offsets(), 1..5).prop_map(|sets| {
        sets.iter()
            .enumerate()
            .map(|(i, offsets)| make_series(&format!("S{i}"), offsets, 10.0 * (i + 1) as f64))
            .collect()
    })
}

// ── 1. Rectangularity ────────────────────────────────────────────────

proptest! {
    #[test]
    fn aligned_series_share_the_index(input in arb_universe()) {
        let symbols = input.len();
        let outcome = align_symbols(input, &AlignBounds::unbounded());
        let data = outcome.data;

        prop_assert!(outcome.dropped.is_empty());
        prop_assert_eq!(data.all_series().len(), symbols);
        for series in data.all_series() {
            prop_assert_eq!(series.timestamps().collect::<Vec<_>>(), data.index().to_vec());
        }
        prop_assert!(data.index().windows(2).all(|w| w[0] < w[1]));
    }
}

// ── 2. Idempotence ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn aligning_twice_is_a_no_op(input in arb_universe()) {
        let once = align_symbols(input, &AlignBounds::unbounded()).data;
        let twice = align_symbols(once.clone().into_series(), &AlignBounds::unbounded()).data;
        prop_assert_eq!(once.fingerprint(), twice.fingerprint());
        prop_assert_eq!(once, twice);
    }
}

// ── 3. Merge ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_keeps_order_and_prefers_fresh(old in arb_offsets(), fresh in arb_offsets()) {
        let cached = make_series("AAA", &old, 10.0);
        let incoming = make_series("AAA", &fresh, 500.0);
        let merged = cached.merge(incoming);

        let expected: BTreeSet<u32> = old.union(&fresh).copied().collect();
        prop_assert_eq!(merged.len(), expected.len());
        prop_assert!(merged.bars().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        for bar in merged.bars() {
            let offset = (bar.timestamp - day(0)).num_days() as u32;
            if fresh.contains(&offset) {
                prop_assert!(bar.open >= 500.0);
            } else {
                prop_assert!(bar.open < 500.0);
            }
        }
    }
}

// ── 4. Windows ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn window_never_exceeds_n_or_ticks(input in arb_universe(), ticks in 0usize..40, n in 0usize..10) {
        let data = align_symbols(input, &AlignBounds::unbounded()).data;
        let universe = ActiveUniverse::new(data.symbols());
        let first = universe.symbols()[0].clone();
        let (tx, _rx) = event_queue();
        let mut feed = ReplayFeed::new(universe, data, tx);

        for _ in 0..ticks {
            feed.advance().unwrap();
        }
        let window = feed.latest_bars(&first, n).unwrap();
        prop_assert!(window.len() <= n);
        prop_assert!(window.len() <= ticks);
        prop_assert!(window.datetime.windows(2).all(|w| w[0] < w[1]));
    }
}
