//! One-shot construction of a market data source from a [`FeedConfig`].
//!
//! Construction resolves the vendor, fetches every symbol on the worker
//! pool, trims and aligns the survivors, and records each exclusion on the
//! universe. Only an empty final universe is fatal.

use super::polling::PollingFeed;
use super::replay::ReplayFeed;
use super::{MarketDataSource, SourceError};
use crate::config::{ApiKeys, FeedConfig, FeedMode, HttpConfig, SourceKind};
use crate::data::{
    align_symbols, fetch_universe, ActiveUniverse, AlignBounds, AlpacaAdapter, CacheWrite, CsvCache,
    ExclusionReason, FetchParams, FetchPlan, FetchProgress, FmpAdapter, FmpFundamentals,
    FundamentalRecord, NoProgress, TdaAdapter, TiingoAdapter, VendorAdapter, VendorClient,
};
use crate::domain::{EventSender, SymbolSeries};
use std::collections::HashMap;
use tracing::{info, warn};

/// Build the adapter for `kind`, pulling its credentials from `keys`.
pub fn vendor_adapter(
    kind: SourceKind,
    client: VendorClient,
    http: &HttpConfig,
    keys: &ApiKeys,
) -> Result<Box<dyn VendorAdapter>, SourceError> {
    let adapter: Box<dyn VendorAdapter> = match kind {
        SourceKind::HistoricArchive => Box::new(TiingoAdapter::new(
            client,
            &http.tiingo_url,
            ApiKeys::require(&keys.tiingo, "TIINGO_API")?,
        )),
        SourceKind::BrokerageLive => Box::new(AlpacaAdapter::new(
            client,
            &http.alpaca_data_url,
            ApiKeys::require(&keys.alpaca_key_id, "alpaca_key_id")?,
            ApiKeys::require(&keys.alpaca_secret_key, "alpaca_secret_key")?,
        )),
        SourceKind::BrokeragePolled => Box::new(TdaAdapter::new(
            client,
            &http.tda_url,
            ApiKeys::require(&keys.tda_consumer_key, "TDD_consumer_key")?,
        )),
        SourceKind::FundamentalsPolled => Box::new(FmpAdapter::new(
            client,
            &http.fmp_url,
            ApiKeys::require(&keys.fmp, "FMP_API")?,
        )),
    };
    Ok(adapter)
}

pub struct SourceBuilder<'a> {
    config: FeedConfig,
    keys: ApiKeys,
    adapter: Option<Box<dyn VendorAdapter>>,
    progress: &'a dyn FetchProgress,
}

impl<'a> SourceBuilder<'a> {
    pub fn new(config: FeedConfig, keys: ApiKeys) -> Self {
        Self {
            config,
            keys,
            adapter: None,
            progress: &NoProgress,
        }
    }

    /// Use `adapter` instead of the one implied by `config.source`.
    pub fn with_adapter(mut self, adapter: Box<dyn VendorAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn FetchProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Cache, fetch range and write policy for the construction-time fan-out.
    fn fetch_setup(&self) -> (Option<CsvCache>, FetchParams, FetchPlan) {
        let config = &self.config;
        let cache = CsvCache::new(&config.cache_dir);
        let plan = FetchPlan {
            workers: config.workers,
            refresh: config.refresh,
            write: CacheWrite::Replace,
        };
        // Vendors read `end` as an instant at or before the end-date bar, so ask
        // for one more day and let alignment cut at the exclusive end.
        let ranged = FetchParams::new(config.frequency)
            .starting(config.start)
            .ending(config.end.and_then(|end| end.succ_opt()));

        match config.source {
            // Whole archive is cached, then trimmed to the run's bounds.
            SourceKind::HistoricArchive => (Some(cache), FetchParams::new(config.frequency), plan),
            SourceKind::FundamentalsPolled if config.frequency.is_intraday() => (
                Some(cache),
                ranged,
                FetchPlan {
                    refresh: true,
                    write: CacheWrite::Append,
                    ..plan
                },
            ),
            _ => (None, ranged, plan),
        }
    }

    /// Load fundamentals for every active symbol, excluding those without any.
    fn load_fundamentals(
        &self,
        client: VendorClient,
        universe: &mut ActiveUniverse,
    ) -> Result<HashMap<String, Vec<FundamentalRecord>>, SourceError> {
        let loader = FmpFundamentals::new(
            client,
            &self.config.http.fmp_url,
            ApiKeys::require(&self.keys.fmp, "FMP_API")?,
            Some(CsvCache::new(&self.config.cache_dir)),
        );
        let mut loaded = HashMap::new();
        for symbol in universe.symbols().to_vec() {
            match loader.load(&symbol, self.config.refresh) {
                Ok(Some(records)) => {
                    loaded.insert(symbol, records);
                }
                Ok(None) => {
                    universe.exclude(&symbol, ExclusionReason::NoFundamentals);
                }
                Err(e) => {
                    warn!(symbol, error = %e, "fundamentals fetch failed");
                    universe.exclude(&symbol, ExclusionReason::TransientFetchFailure(e.to_string()));
                }
            }
        }
        Ok(loaded)
    }

    /// Run the construction pipeline and hand back a ready source.
    pub fn build(self, events: EventSender) -> Result<Box<dyn MarketDataSource>, SourceError> {
        match self.config.mode {
            FeedMode::Backtest => Ok(Box::new(self.build_replay(events)?)),
            FeedMode::Live => Ok(Box::new(self.build_polling(events)?)),
        }
    }

    fn prepare(&mut self) -> Result<(VendorClient, Box<dyn VendorAdapter>, ActiveUniverse), SourceError> {
        self.config.validate()?;
        let client = VendorClient::new(&self.config.http)?;
        let adapter = match self.adapter.take() {
            Some(adapter) => adapter,
            None => vendor_adapter(self.config.source, client.clone(), &self.config.http, &self.keys)?,
        };
        if !adapter.supports(self.config.frequency) {
            return Err(SourceError::UnsupportedFrequency {
                provider: adapter.name().to_string(),
                frequency: self.config.frequency,
            });
        }
        Ok((client, adapter, ActiveUniverse::new(self.config.symbols.iter().cloned())))
    }

    /// Build a backtest replay regardless of `config.mode`.
    pub fn build_replay(mut self, events: EventSender) -> Result<ReplayFeed, SourceError> {
        let (client, adapter, mut universe) = self.prepare()?;
        let fundamentals = if self.config.fundamentals {
            self.load_fundamentals(client, &mut universe)?
        } else {
            HashMap::new()
        };

        let (cache, params, plan) = self.fetch_setup();
        let fetched = fetch_universe(
            adapter.as_ref(),
            cache.as_ref(),
            universe.symbols(),
            &params,
            &plan,
            self.progress,
        )?;

        let mut series: Vec<SymbolSeries> = Vec::with_capacity(fetched.len());
        for item in fetched {
            match item.result {
                Ok((s, _)) => series.push(s),
                Err(reason) => {
                    universe.exclude(&item.symbol, reason);
                }
            }
        }

        let bounds = AlignBounds::for_frequency(self.config.start, self.config.end, self.config.frequency);
        let outcome = align_symbols(series, &bounds);
        for dropped in outcome.dropped {
            universe.exclude(&dropped.symbol, dropped.reason);
        }
        if universe.is_empty() {
            return Err(SourceError::EmptyUniverse {
                excluded: universe.excluded().to_vec(),
            });
        }

        info!(
            source = %self.config.source,
            symbols = universe.len(),
            excluded = universe.excluded().len(),
            ticks = outcome.data.len(),
            "replay ready"
        );
        Ok(ReplayFeed::new(universe, outcome.data, events).with_fundamentals(fundamentals))
    }

    /// Build a live polling source and run its first poll.
    pub fn build_polling(mut self, events: EventSender) -> Result<PollingFeed, SourceError> {
        let (client, adapter, mut universe) = self.prepare()?;
        let fundamentals = if self.config.fundamentals {
            self.load_fundamentals(client, &mut universe)?
        } else {
            HashMap::new()
        };

        let mut feed = PollingFeed::new(
            adapter,
            universe,
            self.config.frequency,
            self.config.lookback_days,
            events,
        )
        .with_fundamentals(fundamentals);
        feed.poll();

        if feed.universe().is_empty() {
            return Err(SourceError::EmptyUniverse {
                excluded: feed.universe().excluded().to_vec(),
            });
        }
        info!(source = %self.config.source, symbols = feed.universe().len(), "live source ready");
        Ok(feed)
    }
}
