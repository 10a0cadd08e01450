//! Active universe: the symbols a source still tracks, and why the others left.
//!
//! The universe only ever shrinks: symbols are excluded during construction
//! (failed fetch, missing bound, no fundamentals) or during a live poll, and
//! are never re-admitted.

use super::provider::AbsentReason;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

/// Which end of the requested range a check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bound {
    Start,
    End,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Start => f.write_str("start"),
            Bound::End => f.write_str("end"),
        }
    }
}

/// Why a symbol was dropped from the universe. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExclusionReason {
    #[error("transient fetch failure: {0}")]
    TransientFetchFailure(String),

    #[error("{bound} bound {at} not present in history")]
    MissingBound { bound: Bound, at: NaiveDateTime },

    #[error("no usable data: {0}")]
    EmptyPayload(AbsentReason),

    #[error("no bars inside the requested range")]
    NoBarsInRange,

    #[error("no fundamentals available")]
    NoFundamentals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub symbol: String,
    pub reason: ExclusionReason,
}

/// Ordered set of tracked symbols plus the exclusion record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveUniverse {
    symbols: Vec<String>,
    excluded: Vec<Exclusion>,
}

impl ActiveUniverse {
    /// Start tracking `symbols`, keeping first-seen order and dropping repeats.
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tracked: Vec<String> = Vec::new();
        for s in symbols {
            let s = s.into();
            if !tracked.contains(&s) {
                tracked.push(s);
            }
        }
        Self {
            symbols: tracked,
            excluded: Vec::new(),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn excluded(&self) -> &[Exclusion] {
        &self.excluded
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The recorded reason a symbol was dropped, if it was.
    pub fn exclusion(&self, symbol: &str) -> Option<&ExclusionReason> {
        self.excluded
            .iter()
            .find(|e| e.symbol == symbol)
            .map(|e| &e.reason)
    }

    /// Drop `symbol`. Returns false if it was not being tracked.
    pub fn exclude(&mut self, symbol: &str, reason: ExclusionReason) -> bool {
        let Some(idx) = self.symbols.iter().position(|s| s == symbol) else {
            return false;
        };
        self.symbols.remove(idx);
        info!(symbol, %reason, remaining = self.symbols.len(), "symbol excluded");
        self.excluded.push(Exclusion {
            symbol: symbol.to_string(),
            reason,
        });
        true
    }
}
