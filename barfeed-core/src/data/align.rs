//! Multi-symbol time alignment.
//!
//! Given series for multiple symbols, trim each to the requested bounds and
//! reindex all of them onto the union of their timestamps. Gaps are
//! forward-filled from the last known bar; positions before a symbol's first
//! bar get a zero sentinel. Nothing is interpolated or back-filled.

use super::universe::{Bound, Exclusion, ExclusionReason};
use crate::domain::{BarRecord, Frequency, SymbolSeries};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeSet;

/// How bounds are checked against a symbol's native index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundPolicy {
    /// Each given bound must appear exactly in the symbol's history.
    #[default]
    Exact,
    /// Bounds only filter; nothing has to line up.
    Range,
}

/// Half-open `[start, end)` trim applied before alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignBounds {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub policy: BoundPolicy,
}

impl AlignBounds {
    /// No trimming at all.
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
            policy: BoundPolicy::Range,
        }
    }

    /// Daily series must contain the bound dates; intraday series are only
    /// filtered, since a session's first bar rarely sits at midnight.
    pub fn for_frequency(start: Option<NaiveDate>, end: Option<NaiveDate>, frequency: Frequency) -> Self {
        let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN);
        Self {
            start: start.map(midnight),
            end: end.map(midnight),
            policy: if frequency.is_intraday() {
                BoundPolicy::Range
            } else {
                BoundPolicy::Exact
            },
        }
    }
}

/// Aligned series for multiple symbols on a common timeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignedData {
    index: Vec<NaiveDateTime>,
    /// One series per symbol, each the same length as `index`.
    series: Vec<SymbolSeries>,
}

impl AlignedData {
    /// The common timestamp axis (sorted ascending).
    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.symbol()).collect()
    }

    pub fn series(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.series.iter().find(|s| s.symbol() == symbol)
    }

    pub fn all_series(&self) -> &[SymbolSeries] {
        &self.series
    }

    pub fn into_series(self) -> Vec<SymbolSeries> {
        self.series
    }

    /// Number of timestamps on the common axis.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// BLAKE3 over every symbol's values, in symbol order, for reproducibility checks.
    pub fn fingerprint(&self) -> String {
        let mut ordered: Vec<&SymbolSeries> = self.series.iter().collect();
        ordered.sort_by(|a, b| a.symbol().cmp(b.symbol()));

        let mut hasher = blake3::Hasher::new();
        for series in ordered {
            hasher.update(series.symbol().as_bytes());
            hasher.update(&[0]);
            for bar in series.bars() {
                hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
                for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
                    hasher.update(&v.to_le_bytes());
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Aligned data plus the symbols that could not be aligned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignOutcome {
    pub data: AlignedData,
    pub dropped: Vec<Exclusion>,
}

/// Trim one series to `bounds`.
pub fn trim_to_bounds(series: &SymbolSeries, bounds: &AlignBounds) -> Result<SymbolSeries, ExclusionReason> {
    let bars = series.bars();
    let (from, to) = match bounds.policy {
        BoundPolicy::Exact => {
            let from = match bounds.start {
                Some(at) => series.position(at).ok_or(ExclusionReason::MissingBound {
                    bound: Bound::Start,
                    at,
                })?,
                None => 0,
            };
            let to = match bounds.end {
                Some(at) => series.position(at).ok_or(ExclusionReason::MissingBound {
                    bound: Bound::End,
                    at,
                })?,
                None => bars.len(),
            };
            (from, to)
        }
        BoundPolicy::Range => {
            let from = bounds
                .start
                .map_or(0, |at| bars.partition_point(|b| b.timestamp < at));
            let to = bounds
                .end
                .map_or(bars.len(), |at| bars.partition_point(|b| b.timestamp < at));
            (from, to)
        }
    };

    let trimmed = series.slice(from, to);
    if trimmed.is_empty() {
        return Err(ExclusionReason::NoBarsInRange);
    }
    Ok(trimmed)
}

/// Reindex `series` onto `index`, forward-filling gaps.
pub fn reindex(series: &SymbolSeries, index: &[NaiveDateTime]) -> SymbolSeries {
    let bars = series.bars();
    let mut out = Vec::with_capacity(index.len());
    let mut next = 0;
    let mut last: Option<&BarRecord> = None;

    for &ts in index {
        while next < bars.len() && bars[next].timestamp <= ts {
            last = Some(&bars[next]);
            next += 1;
        }
        out.push(match last {
            Some(bar) if bar.timestamp == ts => bar.clone(),
            Some(bar) => bar.restamped(ts),
            None => BarRecord::sentinel(series.symbol(), ts),
        });
    }

    SymbolSeries::new(series.symbol(), out)
}

/// Trim every series to `bounds`, then align the survivors.
///
/// Symbol order in the output follows the input order.
pub fn align_symbols(input: Vec<SymbolSeries>, bounds: &AlignBounds) -> AlignOutcome {
    let mut kept = Vec::with_capacity(input.len());
    let mut dropped = Vec::new();

    for series in input {
        match trim_to_bounds(&series, bounds) {
            Ok(trimmed) => kept.push(trimmed),
            Err(reason) => dropped.push(Exclusion {
                symbol: series.symbol().to_string(),
                reason,
            }),
        }
    }

    let index: Vec<NaiveDateTime> = kept
        .iter()
        .flat_map(|s| s.timestamps())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let series = kept.iter().map(|s| reindex(s, &index)).collect();

    AlignOutcome {
        data: AlignedData { index, series },
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(symbol: &str, d: u32, close: f64) -> BarRecord {
        BarRecord {
            symbol: symbol.into(),
            timestamp: day(d),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000.0,
        }
    }

    fn series(symbol: &str, days: &[u32]) -> SymbolSeries {
        SymbolSeries::new(
            symbol,
            days.iter().map(|&d| bar(symbol, d, 100.0 + d as f64)).collect(),
        )
    }

    #[test]
    fn leading_gap_gets_sentinel_and_union_covers_all() {
        let input = vec![series("AAA", &[1, 2, 3, 4, 5]), series("BBB", &[2, 3, 4, 5])];
        let out = align_symbols(input, &AlignBounds::unbounded());

        assert!(out.dropped.is_empty());
        assert_eq!(out.data.index(), &[day(1), day(2), day(3), day(4), day(5)]);
        let bbb = out.data.series("BBB").unwrap();
        assert_eq!(bbb.len(), 5);
        assert!(bbb.bars()[0].is_sentinel());
        assert_eq!(bbb.bars()[0].timestamp, day(1));
        assert_eq!(bbb.bars()[1].close, 102.0);
    }

    #[test]
    fn interior_gap_is_forward_filled_and_restamped() {
        let input = vec![series("SPY", &[2, 3, 4]), series("QQQ", &[2, 4])];
        let out = align_symbols(input, &AlignBounds::unbounded());

        let qqq = out.data.series("QQQ").unwrap();
        assert_eq!(qqq.bars()[1].timestamp, day(3));
        assert_eq!(qqq.bars()[1].close, 102.0);
        assert_eq!(qqq.bars()[1].volume, 1000.0);
        assert_eq!(qqq.bars()[2].close, 104.0);
    }

    #[test]
    fn output_is_rectangular() {
        let input = vec![
            series("A", &[1, 5, 9]),
            series("B", &[2, 3]),
            series("C", &[9, 10]),
        ];
        let out = align_symbols(input, &AlignBounds::unbounded());
        let n = out.data.len();
        for s in out.data.all_series() {
            assert_eq!(s.len(), n);
            assert!(s.timestamps().eq(out.data.index().iter().copied()));
        }
    }

    #[test]
    fn alignment_is_idempotent() {
        let input = vec![series("A", &[1, 3, 5]), series("B", &[2, 3, 4])];
        let once = align_symbols(input, &AlignBounds::unbounded()).data;
        let twice = align_symbols(once.clone().into_series(), &AlignBounds::unbounded()).data;
        assert_eq!(once, twice);
    }

    #[test]
    fn exact_start_must_exist() {
        let bounds = AlignBounds::for_frequency(NaiveDate::from_ymd_opt(2020, 1, 2), None, Frequency::Daily);
        let input = vec![series("AAA", &[1, 2, 3]), series("BBB", &[3, 4])];
        let out = align_symbols(input, &bounds);

        assert_eq!(out.data.symbols(), vec!["AAA"]);
        assert_eq!(out.data.index(), &[day(2), day(3)]);
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.dropped[0].symbol, "BBB");
        assert_eq!(
            out.dropped[0].reason,
            ExclusionReason::MissingBound {
                bound: Bound::Start,
                at: day(2)
            }
        );
    }

    #[test]
    fn end_bound_is_exclusive() {
        let bounds = AlignBounds::for_frequency(
            NaiveDate::from_ymd_opt(2020, 1, 1),
            NaiveDate::from_ymd_opt(2020, 1, 3),
            Frequency::Daily,
        );
        let out = align_symbols(vec![series("AAA", &[1, 2, 3, 4])], &bounds);
        assert_eq!(out.data.index(), &[day(1), day(2)]);
    }

    #[test]
    fn exact_end_must_exist() {
        let bounds = AlignBounds::for_frequency(None, NaiveDate::from_ymd_opt(2020, 1, 9), Frequency::Daily);
        let out = align_symbols(vec![series("AAA", &[1, 2])], &bounds);
        assert!(out.data.is_empty());
        assert!(matches!(
            out.dropped[0].reason,
            ExclusionReason::MissingBound { bound: Bound::End, .. }
        ));
    }

    #[test]
    fn range_policy_filters_without_exact_match() {
        let bounds = AlignBounds::for_frequency(
            NaiveDate::from_ymd_opt(2020, 1, 2),
            NaiveDate::from_ymd_opt(2020, 1, 4),
            Frequency::Minute5,
        );
        let mut bars = series("AAA", &[1, 2, 3, 4]).into_bars();
        for b in &mut bars {
            b.timestamp = b.timestamp + chrono::Duration::minutes(570);
        }
        let out = align_symbols(vec![SymbolSeries::new("AAA", bars)], &bounds);
        assert_eq!(out.data.len(), 2);
        assert_eq!(out.data.index()[0], day(2) + chrono::Duration::minutes(570));
    }

    #[test]
    fn range_with_nothing_inside_is_excluded() {
        let bounds = AlignBounds {
            start: Some(day(20)),
            end: None,
            policy: BoundPolicy::Range,
        };
        let out = align_symbols(vec![series("AAA", &[1, 2])], &bounds);
        assert_eq!(out.dropped[0].reason, ExclusionReason::NoBarsInRange);
    }

    #[test]
    fn empty_input_aligns_to_empty() {
        let out = align_symbols(Vec::new(), &AlignBounds::unbounded());
        assert!(out.data.is_empty());
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn fingerprint_ignores_input_order_but_not_values() {
        let a = align_symbols(
            vec![series("A", &[1, 2]), series("B", &[1, 2])],
            &AlignBounds::unbounded(),
        )
        .data;
        let b = align_symbols(
            vec![series("B", &[1, 2]), series("A", &[1, 2])],
            &AlignBounds::unbounded(),
        )
        .data;
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = align_symbols(
            vec![series("A", &[1, 2]), series("B", &[1, 3])],
            &AlignBounds::unbounded(),
        )
        .data;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
