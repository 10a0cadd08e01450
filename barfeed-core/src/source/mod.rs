//! Market data sources: the drip-feed surface consumers pull bars from.
//!
//! A source is built once by [`SourceBuilder`] and then driven by the
//! caller's event loop: each [`MarketDataSource::advance`] exposes the next
//! bar of every active symbol and pushes exactly one `MarketEvent`.

pub mod builder;
pub mod cursor;
pub mod history;
pub mod polling;
pub mod replay;

pub use builder::{vendor_adapter, SourceBuilder};
pub use cursor::ReplayCursor;
pub use history::{BarField, BarWindow, RollingHistory};
pub use polling::PollingFeed;
pub use replay::ReplayFeed;

use crate::config::ConfigError;
use crate::data::{ActiveUniverse, DataError, Exclusion, FundamentalRecord};
use crate::domain::{BarRecord, Frequency};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),

    #[error("no symbols left after construction ({} excluded)", excluded.len())]
    EmptyUniverse { excluded: Vec<Exclusion> },

    #[error("{provider} does not serve {frequency} bars")]
    UnsupportedFrequency { provider: String, frequency: Frequency },

    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),

    #[error("event queue closed")]
    QueueClosed,

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Bars for a fixed universe, exposed one tick at a time.
///
/// Consumers only ever see bars at or before the latest tick.
pub trait MarketDataSource: Send {
    /// Up to the last `n` bars seen for `symbol`, oldest first.
    ///
    /// Fewer than `n` before enough ticks have passed; empty for `n == 0`.
    fn latest_bars(&self, symbol: &str, n: usize) -> Result<BarWindow, SourceError>;

    fn latest_bar(&self, symbol: &str) -> Result<Option<BarRecord>, SourceError> {
        Ok(self.latest_bars(symbol, 1)?.last())
    }

    /// Move to the next tick and push one `MarketEvent`.
    fn advance(&mut self) -> Result<(), SourceError>;

    /// False once any symbol has run out of bars.
    fn continue_run(&self) -> bool;

    /// Symbols still active, in configured order.
    fn symbols(&self) -> &[String] {
        self.universe().symbols()
    }

    fn universe(&self) -> &ActiveUniverse;

    /// Quarterly fundamentals, when loaded.
    fn fundamentals(&self, _symbol: &str) -> Option<&[FundamentalRecord]> {
        None
    }

    /// Symbol whose exhaustion ended the run.
    fn exhausted_by(&self) -> Option<&str> {
        None
    }

    /// Content hash of the replayed dataset, for sources that have one.
    fn fingerprint(&self) -> Option<&str> {
        None
    }
}
