//! SymbolSeries: an ordered, duplicate-free run of bars for one symbol.

use super::BarRecord;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Bars for one symbol, oldest first, with strictly increasing timestamps.
///
/// The only way to build one is [`SymbolSeries::new`], which normalizes its
/// input, so the ordering invariant holds for every instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSeries {
    symbol: String,
    bars: Vec<BarRecord>,
}

impl SymbolSeries {
    /// Sort `bars` by timestamp and drop duplicate timestamps.
    ///
    /// The sort is stable, so when two bars share a timestamp the one that
    /// came first in `bars` is kept.
    pub fn new(symbol: impl Into<String>, mut bars: Vec<BarRecord>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[BarRecord] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<BarRecord> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&BarRecord> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&BarRecord> {
        self.bars.last()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.bars.iter().map(|b| b.timestamp)
    }

    /// Index of the bar stamped exactly `ts`.
    pub fn position(&self, ts: NaiveDateTime) -> Option<usize> {
        self.bars.binary_search_by_key(&ts, |b| b.timestamp).ok()
    }

    /// Merge `fresh` into this series. On a timestamp collision the bar from
    /// `fresh` wins.
    pub fn merge(self, fresh: SymbolSeries) -> SymbolSeries {
        let mut bars = fresh.bars;
        bars.extend(self.bars);
        SymbolSeries::new(self.symbol, bars)
    }

    /// Sub-series of bars in `[from, to)`.
    pub fn slice(&self, from: usize, to: usize) -> SymbolSeries {
        let to = to.min(self.bars.len());
        let from = from.min(to);
        SymbolSeries {
            symbol: self.symbol.clone(),
            bars: self.bars[from..to].to_vec(),
        }
    }
}
