//! Forward-only cursor over one symbol's aligned series.

use crate::domain::{BarRecord, SymbolSeries};

/// Yields each bar of a series exactly once, oldest first. Not restartable.
#[derive(Debug)]
pub struct ReplayCursor {
    symbol: String,
    bars: std::vec::IntoIter<BarRecord>,
}

impl ReplayCursor {
    pub fn new(series: SymbolSeries) -> Self {
        Self {
            symbol: series.symbol().to_string(),
            bars: series.into_bars().into_iter(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Bars not yet yielded.
    pub fn remaining(&self) -> usize {
        self.bars.len()
    }
}

impl Iterator for ReplayCursor {
    type Item = BarRecord;

    fn next(&mut self) -> Option<BarRecord> {
        self.bars.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.bars.size_hint()
    }
}

impl ExactSizeIterator for ReplayCursor {}
