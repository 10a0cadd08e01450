//! BarRecord: the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV observation for a single symbol at a single timestamp.
///
/// Prices and volume are non-negative. Volume is carried as `f64` because
/// some providers report fractional volume; integer volumes are exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl BarRecord {
    /// Zero-valued placeholder used for positions before a symbol's first
    /// observation on an aligned index.
    pub fn sentinel(symbol: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
        }
    }

    /// Returns true if this is a leading-gap placeholder (all fields zero).
    pub fn is_sentinel(&self) -> bool {
        self.open == 0.0
            && self.high == 0.0
            && self.low == 0.0
            && self.close == 0.0
            && self.volume == 0.0
    }

    /// Copy of this bar carried forward to a later timestamp.
    pub fn restamped(&self, timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// Basic OHLCV sanity check: finite, non-negative, high >= low, open/close inside the range.
    pub fn is_sane(&self) -> bool {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}
