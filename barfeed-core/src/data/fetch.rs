//! Fetch orchestrator: fans a universe out over a bounded worker pool.
//!
//! Each worker runs cache → vendor → cache write for one symbol and touches
//! no shared mutable state; results are collected in input order once every
//! worker has finished.

use super::cache::CsvCache;
use super::provider::{DataError, FetchOutcome, FetchParams, Provenance, VendorAdapter};
use super::universe::ExclusionReason;
use crate::domain::SymbolSeries;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// How a vendor result is written back to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheWrite {
    /// Replace the cached file.
    #[default]
    Replace,
    /// Merge into the cached file, fresh rows winning.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    /// Threads in the private pool.
    pub workers: usize,
    /// Skip the cache lookup and always hit the vendor.
    pub refresh: bool,
    pub write: CacheWrite,
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self {
            workers: 6,
            refresh: false,
            write: CacheWrite::Replace,
        }
    }
}

/// Callbacks fired from worker threads as symbols complete.
pub trait FetchProgress: Sync {
    fn on_complete(&self, symbol: &str, result: &Result<Provenance, ExclusionReason>);
}

/// Progress sink that ignores everything.
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_complete(&self, _symbol: &str, _result: &Result<Provenance, ExclusionReason>) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSymbol {
    pub symbol: String,
    pub result: Result<(SymbolSeries, Provenance), ExclusionReason>,
}

/// Counts over one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchSummary {
    pub total: usize,
    pub from_cache: usize,
    pub from_vendor: usize,
    pub failed: usize,
}

impl FetchSummary {
    pub fn of(results: &[FetchedSymbol]) -> Self {
        let mut summary = FetchSummary {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            match &r.result {
                Ok((_, Provenance::Cache)) => summary.from_cache += 1,
                Ok((_, Provenance::Vendor)) => summary.from_vendor += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Fetch one symbol: cache first (unless refreshing), then the vendor.
///
/// Vendor results are written back when a cache is given. A failed cache
/// write is logged and the fetched series is still returned.
pub fn fetch_symbol(
    adapter: &dyn VendorAdapter,
    cache: Option<&CsvCache>,
    symbol: &str,
    params: &FetchParams,
    plan: &FetchPlan,
) -> Result<(SymbolSeries, Provenance), ExclusionReason> {
    if let Some(cache) = cache.filter(|_| !plan.refresh) {
        match cache.load(symbol, params.frequency) {
            Ok(Some(series)) => return Ok((series, Provenance::Cache)),
            Ok(None) => debug!(symbol, "cache miss"),
            Err(e) => warn!(symbol, error = %e, "cache read failed, fetching from vendor"),
        }
    }

    match adapter.fetch_series(symbol, params) {
        Ok(FetchOutcome::Series(series)) => {
            let Some(cache) = cache else {
                return Ok((series, Provenance::Vendor));
            };
            let stored = match plan.write {
                CacheWrite::Replace => cache
                    .save(symbol, params.frequency, &series)
                    .map(|()| series.clone()),
                CacheWrite::Append => cache.append(symbol, params.frequency, &series),
            };
            match stored {
                Ok(series) => Ok((series, Provenance::Vendor)),
                Err(e) => {
                    warn!(symbol, error = %e, "cache write failed");
                    Ok((series, Provenance::Vendor))
                }
            }
        }
        Ok(FetchOutcome::Absent(reason)) => {
            debug!(symbol, provider = adapter.name(), %reason, "no data from provider");
            Err(ExclusionReason::EmptyPayload(reason))
        }
        Err(e) => {
            warn!(symbol, provider = adapter.name(), error = %e, "fetch failed");
            Err(ExclusionReason::TransientFetchFailure(e.to_string()))
        }
    }
}

/// Fetch every symbol on a private pool of `plan.workers` threads.
///
/// Results come back in the order of `symbols`. Only failure to build the
/// pool is an error; per-symbol failures are carried in each result.
pub fn fetch_universe(
    adapter: &dyn VendorAdapter,
    cache: Option<&CsvCache>,
    symbols: &[String],
    params: &FetchParams,
    plan: &FetchPlan,
    progress: &dyn FetchProgress,
) -> Result<Vec<FetchedSymbol>, DataError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(plan.workers.max(1))
        .thread_name(|i| format!("barfeed-fetch-{i}"))
        .build()
        .map_err(|e| DataError::WorkerPool(e.to_string()))?;

    let results: Vec<FetchedSymbol> = pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| {
                let result = fetch_symbol(adapter, cache, symbol, params, plan);
                let status = result.as_ref().map(|(_, p)| *p).map_err(|e| e.clone());
                progress.on_complete(symbol, &status);
                FetchedSymbol {
                    symbol: symbol.clone(),
                    result,
                }
            })
            .collect()
    });

    let summary = FetchSummary::of(&results);
    info!(
        provider = adapter.name(),
        total = summary.total,
        from_cache = summary.from_cache,
        from_vendor = summary.from_vendor,
        failed = summary.failed,
        "fetch complete"
    );
    Ok(results)
}
