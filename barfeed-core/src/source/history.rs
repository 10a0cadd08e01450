//! Per-symbol "seen so far" bars and the last-N view handed to consumers.

use crate::domain::BarRecord;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Numeric column of a [`BarWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// The last N bars of one symbol, oldest first, as parallel columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BarWindow {
    pub symbol: String,
    pub datetime: Vec<NaiveDateTime>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl BarWindow {
    pub fn from_bars(symbol: &str, bars: &[BarRecord]) -> Self {
        Self {
            symbol: symbol.to_string(),
            datetime: bars.iter().map(|b| b.timestamp).collect(),
            open: bars.iter().map(|b| b.open).collect(),
            high: bars.iter().map(|b| b.high).collect(),
            low: bars.iter().map(|b| b.low).collect(),
            close: bars.iter().map(|b| b.close).collect(),
            volume: bars.iter().map(|b| b.volume).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.datetime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datetime.is_empty()
    }

    pub fn field(&self, field: BarField) -> &[f64] {
        match field {
            BarField::Open => &self.open,
            BarField::High => &self.high,
            BarField::Low => &self.low,
            BarField::Close => &self.close,
            BarField::Volume => &self.volume,
        }
    }

    /// Rebuild row-oriented bars. Stops at the shortest column.
    pub fn bars(&self) -> Vec<BarRecord> {
        self.datetime
            .iter()
            .zip(&self.open)
            .zip(&self.high)
            .zip(&self.low)
            .zip(&self.close)
            .zip(&self.volume)
            .map(|(((((&timestamp, &open), &high), &low), &close), &volume)| BarRecord {
                symbol: self.symbol.clone(),
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            })
            .collect()
    }

    /// Final complete row, matching the last element of [`bars`](Self::bars).
    pub fn last(&self) -> Option<BarRecord> {
        let rows = [
            self.datetime.len(),
            self.open.len(),
            self.high.len(),
            self.low.len(),
            self.close.len(),
            self.volume.len(),
        ];
        let i = rows.into_iter().min()?.checked_sub(1)?;
        Some(BarRecord {
            symbol: self.symbol.clone(),
            timestamp: self.datetime[i],
            open: self.open[i],
            high: self.high[i],
            low: self.low[i],
            close: self.close[i],
            volume: self.volume[i],
        })
    }
}

/// Bars observed so far, per tracked symbol.
///
/// Replay sources append one bar per tick; polling sources replace a
/// symbol's history wholesale on every poll.
#[derive(Debug, Clone, Default)]
pub struct RollingHistory {
    bars: HashMap<String, Vec<BarRecord>>,
}

impl RollingHistory {
    pub fn new<'a>(symbols: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            bars: symbols.into_iter().map(|s| (s.clone(), Vec::new())).collect(),
        }
    }

    pub fn tracks(&self, symbol: &str) -> bool {
        self.bars.contains_key(symbol)
    }

    /// Append a bar to its symbol's history. Bars for untracked symbols are ignored.
    pub fn push(&mut self, bar: BarRecord) {
        if let Some(history) = self.bars.get_mut(&bar.symbol) {
            history.push(bar);
        }
    }

    pub fn replace(&mut self, symbol: &str, bars: Vec<BarRecord>) {
        if let Some(history) = self.bars.get_mut(symbol) {
            *history = bars;
        }
    }

    pub fn remove(&mut self, symbol: &str) {
        self.bars.remove(symbol);
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.bars.get(symbol).map_or(0, Vec::len)
    }

    pub fn latest(&self, symbol: &str) -> Option<&BarRecord> {
        self.bars.get(symbol)?.last()
    }

    /// Up to the last `n` bars, oldest first. `None` for an untracked symbol.
    pub fn window(&self, symbol: &str, n: usize) -> Option<BarWindow> {
        let history = self.bars.get(symbol)?;
        let from = history.len().saturating_sub(n);
        Some(BarWindow::from_bars(symbol, &history[from..]))
    }
}
