//! Barfeed Core: market data ingestion, caching, alignment and drip-feed replay.
//!
//! This crate contains:
//! - Domain types (bars, series, frequencies, queue events)
//! - Vendor adapters for Tiingo, Alpaca, TD Ameritrade and Financial Modeling Prep
//! - A per-symbol CSV cache with metadata sidecars
//! - Parallel fetch fan-out and multi-symbol alignment with forward-fill
//! - Replay and polling sources that expose bars one tick at a time

pub mod config;
pub mod data;
pub mod domain;
pub mod source;

pub use config::{ApiKeys, ConfigError, FeedConfig, FeedMode, HttpConfig, SourceKind};
pub use source::{MarketDataSource, SourceBuilder, SourceError};
