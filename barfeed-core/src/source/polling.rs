//! Live sources: re-poll a lookback window on every tick.

use super::history::{BarWindow, RollingHistory};
use super::{MarketDataSource, SourceError};
use crate::data::{
    align_symbols, ActiveUniverse, AlignBounds, ExclusionReason, FetchOutcome, FetchParams,
    FundamentalRecord, VendorAdapter,
};
use crate::domain::timestamp::exchange_today;
use crate::domain::{Event, EventSender, Frequency, MarketEvent, SymbolSeries};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Polls the vendor for the last `lookback_days` of bars on each advance and
/// replaces every symbol's history with the fresh, aligned window.
///
/// A symbol whose poll fails keeps its previous history. A symbol that has
/// never produced data and comes back absent is excluded.
pub struct PollingFeed {
    adapter: Box<dyn VendorAdapter>,
    frequency: Frequency,
    lookback_days: u32,
    today: fn() -> NaiveDate,
    universe: ActiveUniverse,
    history: RollingHistory,
    events: EventSender,
    continue_run: bool,
    polls: usize,
    fundamentals: HashMap<String, Vec<FundamentalRecord>>,
}

impl PollingFeed {
    pub fn new(
        adapter: Box<dyn VendorAdapter>,
        universe: ActiveUniverse,
        frequency: Frequency,
        lookback_days: u32,
        events: EventSender,
    ) -> Self {
        let history = RollingHistory::new(universe.symbols());
        Self {
            adapter,
            frequency,
            lookback_days,
            today: exchange_today,
            universe,
            history,
            events,
            continue_run: true,
            polls: 0,
            fundamentals: HashMap::new(),
        }
    }

    pub fn with_fundamentals(mut self, fundamentals: HashMap<String, Vec<FundamentalRecord>>) -> Self {
        self.fundamentals = fundamentals;
        self
    }

    /// Override the clock used to place the lookback window.
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    fn params(&self) -> FetchParams {
        let start = (self.today)() - Duration::days(i64::from(self.lookback_days));
        FetchParams::new(self.frequency).starting(Some(start))
    }

    /// Fetch the lookback window for every active symbol and swap it in.
    pub fn poll(&mut self) {
        let params = self.params();
        let mut fresh: Vec<SymbolSeries> = Vec::with_capacity(self.universe.len());

        for symbol in self.universe.symbols().to_vec() {
            match self.adapter.fetch_series(&symbol, &params) {
                Ok(FetchOutcome::Series(series)) => fresh.push(series),
                Ok(FetchOutcome::Absent(reason)) if self.history.len(&symbol) == 0 => {
                    self.universe.exclude(&symbol, ExclusionReason::EmptyPayload(reason));
                    self.history.remove(&symbol);
                }
                Ok(FetchOutcome::Absent(reason)) => {
                    warn!(symbol, %reason, "poll returned no data, keeping previous bars");
                }
                Err(e) => {
                    warn!(symbol, error = %e, "poll failed, keeping previous bars");
                }
            }
        }

        let aligned = align_symbols(fresh, &AlignBounds::unbounded());
        for series in aligned.data.into_series() {
            let symbol = series.symbol().to_string();
            self.history.replace(&symbol, series.into_bars());
        }

        self.polls += 1;
        if self.universe.is_empty() && self.continue_run {
            self.continue_run = false;
            info!(polls = self.polls, "every symbol excluded, stopping");
        }
        debug!(polls = self.polls, active = self.universe.len(), "poll complete");
    }
}

impl MarketDataSource for PollingFeed {
    fn latest_bars(&self, symbol: &str, n: usize) -> Result<BarWindow, SourceError> {
        if !self.universe.contains(symbol) {
            return Err(SourceError::UnknownSymbol(symbol.to_string()));
        }
        self.history
            .window(symbol, n)
            .ok_or_else(|| SourceError::UnknownSymbol(symbol.to_string()))
    }

    fn advance(&mut self) -> Result<(), SourceError> {
        self.poll();
        self.events
            .send(Event::Market(MarketEvent))
            .map_err(|_| SourceError::QueueClosed)
    }

    fn continue_run(&self) -> bool {
        self.continue_run
    }

    fn universe(&self) -> &ActiveUniverse {
        &self.universe
    }

    fn fundamentals(&self, symbol: &str) -> Option<&[FundamentalRecord]> {
        self.fundamentals.get(symbol).map(Vec::as_slice)
    }
}
