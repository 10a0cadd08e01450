//! Data layer: vendor adapters, HTTP plumbing, CSV cache, fetch fan-out, alignment.

pub mod align;
pub mod alpaca;
pub mod cache;
pub mod circuit_breaker;
pub mod fetch;
pub mod fmp;
pub mod fundamentals;
pub mod http;
pub mod provider;
pub mod tda;
pub mod tiingo;
pub mod universe;

pub use align::{align_symbols, AlignBounds, AlignOutcome, AlignedData, BoundPolicy};
pub use alpaca::AlpacaAdapter;
pub use cache::{CacheMeta, CacheStatus, CsvCache};
pub use circuit_breaker::CircuitBreaker;
pub use fetch::{
    fetch_symbol, fetch_universe, CacheWrite, FetchPlan, FetchProgress, FetchSummary, FetchedSymbol,
    NoProgress,
};
pub use fmp::FmpAdapter;
pub use fundamentals::{FmpFundamentals, FundamentalRecord};
pub use http::{Reply, VendorClient};
pub use provider::{AbsentReason, DataError, FetchOutcome, FetchParams, Provenance, VendorAdapter};
pub use tda::TdaAdapter;
pub use tiingo::TiingoAdapter;
pub use universe::{ActiveUniverse, Bound, Exclusion, ExclusionReason};
