//! Backtest replay over pre-aligned data.

use super::cursor::ReplayCursor;
use super::history::{BarWindow, RollingHistory};
use super::{MarketDataSource, SourceError};
use crate::data::{ActiveUniverse, AlignedData, FundamentalRecord};
use crate::domain::{Event, EventSender, MarketEvent};
use std::collections::HashMap;
use tracing::{debug, info};

/// Drip-feeds an aligned dataset one index position per tick.
///
/// Every active symbol has a bar at every position, so one advance exposes
/// one bar per symbol. The run ends the first time any cursor is empty.
pub struct ReplayFeed {
    universe: ActiveUniverse,
    cursors: Vec<ReplayCursor>,
    history: RollingHistory,
    events: EventSender,
    continue_run: bool,
    exhausted_by: Option<String>,
    ticks: usize,
    fingerprint: String,
    fundamentals: HashMap<String, Vec<FundamentalRecord>>,
}

impl ReplayFeed {
    /// `universe` must list exactly the symbols present in `data`.
    pub fn new(universe: ActiveUniverse, data: AlignedData, events: EventSender) -> Self {
        let fingerprint = data.fingerprint();
        let history = RollingHistory::new(universe.symbols());
        let cursors = data.into_series().into_iter().map(ReplayCursor::new).collect();
        Self {
            universe,
            cursors,
            history,
            events,
            continue_run: true,
            exhausted_by: None,
            ticks: 0,
            fingerprint,
            fundamentals: HashMap::new(),
        }
    }

    pub fn with_fundamentals(mut self, fundamentals: HashMap<String, Vec<FundamentalRecord>>) -> Self {
        self.fundamentals = fundamentals;
        self
    }

    /// Advances performed so far.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Ticks left before the shortest cursor runs dry.
    pub fn remaining(&self) -> usize {
        self.cursors.iter().map(ReplayCursor::remaining).min().unwrap_or(0)
    }
}

impl MarketDataSource for ReplayFeed {
    fn latest_bars(&self, symbol: &str, n: usize) -> Result<BarWindow, SourceError> {
        if !self.universe.contains(symbol) {
            return Err(SourceError::UnknownSymbol(symbol.to_string()));
        }
        self.history
            .window(symbol, n)
            .ok_or_else(|| SourceError::UnknownSymbol(symbol.to_string()))
    }

    fn advance(&mut self) -> Result<(), SourceError> {
        for cursor in &mut self.cursors {
            match cursor.next() {
                Some(bar) => self.history.push(bar),
                None if self.continue_run => {
                    self.continue_run = false;
                    self.exhausted_by = Some(cursor.symbol().to_string());
                    info!(symbol = cursor.symbol(), ticks = self.ticks, "replay exhausted");
                }
                None => {}
            }
        }
        self.ticks += 1;
        debug!(tick = self.ticks, "market event");
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

    fn exhausted_by(&self) -> Option<&str> {
        self.exhausted_by.as_deref()
    }

    fn fingerprint(&self) -> Option<&str> {
        Some(&self.fingerprint)
    }
}
