//! Vendor adapter trait and structured error types.
//!
//! The `VendorAdapter` trait abstracts over price-history providers (Tiingo,
//! Alpaca, TD Ameritrade, Financial Modeling Prep) so sources can be composed
//! from any of them and tests can substitute a stub. The cache layer sits above
//! this trait: adapters don't know about the cache.

use crate::domain::{BarRecord, Frequency, SymbolSeries};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request parameters for one symbol's history.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    pub frequency: Frequency,
    /// First date to request. `None` lets the adapter use its full archive.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Maximum number of bars, for providers that page.
    pub limit: Option<usize>,
}

impl FetchParams {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            start: None,
            end: None,
            limit: None,
        }
    }

    pub fn starting(mut self, start: Option<NaiveDate>) -> Self {
        self.start = start;
        self
    }

    pub fn ending(mut self, end: Option<NaiveDate>) -> Self {
        self.end = end;
        self
    }
}

/// Why a provider had nothing usable for a symbol.
///
/// These are ordinary outcomes, not errors: callers exclude the symbol and
/// carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbsentReason {
    #[error("provider answered HTTP {0}")]
    HttpStatus(u16),

    #[error("provider returned an empty series")]
    EmptyPayload,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("symbol or frequency not supported by provider")]
    UnsupportedSymbol,
}

/// Result of a fetch that reached the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Series(SymbolSeries),
    Absent(AbsentReason),
}

impl FetchOutcome {
    /// Normalize vendor bars into a series; an empty result is `Absent`.
    pub fn from_bars(symbol: &str, bars: Vec<BarRecord>) -> Self {
        if bars.is_empty() {
            FetchOutcome::Absent(AbsentReason::EmptyPayload)
        } else {
            FetchOutcome::Series(SymbolSeries::new(symbol, bars))
        }
    }
}

/// Transport, storage and parsing failures.
///
/// Displayable as-is in CLI output and log lines.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("hard stop: provider requests blocked (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Cache,
    Vendor,
}

/// Trait for price-history providers.
///
/// `fetch_series` never fails for ordinary provider problems (HTTP error,
/// empty payload, unknown symbol); those come back as
/// `FetchOutcome::Absent`. Only transport failures surface as `Err`.
pub trait VendorAdapter: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Whether the provider can serve bars at this frequency.
    fn supports(&self, frequency: Frequency) -> bool;

    /// Fetch one symbol's history, normalized oldest-first.
    fn fetch_series(&self, symbol: &str, params: &FetchParams) -> Result<FetchOutcome, DataError>;
}
