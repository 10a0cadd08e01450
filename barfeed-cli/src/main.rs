//! Barfeed CLI: download, replay, and cache inspection commands.
//!
//! Commands:
//! - `download`: fetch symbols from a vendor into the CSV cache
//! - `replay`: build a source from a TOML config and drive it tick by tick
//! - `cache status`: report cached date ranges and row counts

use anyhow::{bail, Result};
use barfeed_core::config::{ApiKeys, FeedConfig, FeedMode, HttpConfig, SourceKind};
use barfeed_core::data::{
    fetch_universe, CacheWrite, CsvCache, ExclusionReason, FetchParams, FetchPlan, FetchProgress,
    FetchSummary, Provenance, VendorClient,
};
use barfeed_core::domain::{event_queue, Event, Frequency};
use barfeed_core::source::{vendor_adapter, SourceBuilder};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barfeed", about = "Barfeed: market data ingestion and drip-feed replay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download symbols from a vendor into the CSV cache.
    Download {
        /// Symbols to download (e.g., SPY QQQ AAPL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Vendor: historic_archive, brokerage_live, brokerage_polled, fundamentals_polled.
        #[arg(long, default_value = "historic_archive", value_parser = parse_source)]
        source: SourceKind,

        /// Bar frequency: 1min, 5min, 15min, 30min, 1hour, 4hour, daily.
        #[arg(long, default_value = "daily")]
        frequency: Frequency,

        /// First date (YYYY-MM-DD). Defaults to the vendor's full history.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Exclusive end date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Re-download even if cached.
        #[arg(long, default_value_t = false)]
        refresh: bool,

        /// Worker threads.
        #[arg(long, default_value_t = 6)]
        workers: usize,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Build a source from a TOML config and replay it.
    Replay {
        /// Path to a TOML feed config.
        #[arg(long)]
        config: PathBuf,

        /// Stop after this many ticks.
        #[arg(long)]
        ticks: Option<usize>,

        /// Seconds between polls for live sources.
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached date ranges and row counts.
    Status {
        /// Symbols to report on.
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Bar frequency.
        #[arg(long, default_value = "daily")]
        frequency: Frequency,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

fn parse_source(s: &str) -> std::result::Result<SourceKind, String> {
    [
        SourceKind::HistoricArchive,
        SourceKind::BrokerageLive,
        SourceKind::BrokeragePolled,
        SourceKind::FundamentalsPolled,
    ]
    .into_iter()
    .find(|k| k.as_str() == s.trim())
    .ok_or_else(|| format!("unknown source '{s}'"))
}

/// Prints one line per symbol as workers finish.
struct StdoutProgress;

impl FetchProgress for StdoutProgress {
    fn on_complete(&self, symbol: &str, result: &Result<Provenance, ExclusionReason>) {
        match result {
            Ok(Provenance::Cache) => println!("  CACHED: {symbol}"),
            Ok(Provenance::Vendor) => println!("  OK: {symbol}"),
            Err(reason) => println!("  FAIL: {symbol}: {reason}"),
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barfeed=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            symbols,
            source,
            frequency,
            start,
            end,
            refresh,
            workers,
            cache_dir,
        } => run_download(symbols, source, frequency, start, end, refresh, workers, &cache_dir),
        Commands::Replay {
            config,
            ticks,
            interval,
        } => run_replay(&config, ticks, Duration::from_secs(interval)),
        Commands::Cache { action } => match action {
            CacheAction::Status {
                symbols,
                frequency,
                cache_dir,
            } => run_cache_status(&symbols, frequency, &cache_dir),
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn run_download(
    symbols: Vec<String>,
    source: SourceKind,
    frequency: Frequency,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    refresh: bool,
    workers: usize,
    cache_dir: &Path,
) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end <= start {
            bail!("--end ({end}) must be after --start ({start})");
        }
    }

    let http = HttpConfig::default();
    let client = VendorClient::new(&http)?;
    let adapter = vendor_adapter(source, client, &http, &ApiKeys::from_env())?;
    if !adapter.supports(frequency) {
        bail!("{} does not serve {frequency} bars", adapter.name());
    }

    let cache = CsvCache::new(cache_dir);
    let params = FetchParams::new(frequency).starting(start).ending(end);
    let plan = FetchPlan {
        workers,
        refresh,
        write: if source == SourceKind::FundamentalsPolled && frequency.is_intraday() {
            CacheWrite::Append
        } else {
            CacheWrite::Replace
        },
    };

    println!("Fetching {} symbol(s) from {}...", symbols.len(), adapter.name());
    let results = fetch_universe(adapter.as_ref(), Some(&cache), &symbols, &params, &plan, &StdoutProgress)?;
    let summary = FetchSummary::of(&results);
    println!(
        "\nDownload complete: {}/{} succeeded ({} cached), {} failed",
        summary.from_cache + summary.from_vendor,
        summary.total,
        summary.from_cache,
        summary.failed
    );

    if !summary.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_replay(config_path: &Path, max_ticks: Option<usize>, interval: Duration) -> Result<()> {
    let config = FeedConfig::from_file(config_path)?;
    let live = config.mode == FeedMode::Live;
    let (tx, rx) = event_queue();
    let mut source = SourceBuilder::new(config, ApiKeys::from_env()).build(tx)?;

    for exclusion in source.universe().excluded() {
        println!("EXCLUDED: {}: {}", exclusion.symbol, exclusion.reason);
    }
    println!("Active: {}", source.symbols().join(", "));

    let mut ticks = 0usize;
    let mut market_events = 0usize;
    while source.continue_run() && max_ticks.map_or(true, |n| ticks < n) {
        if live && ticks > 0 {
            std::thread::sleep(interval);
        }
        source.advance()?;
        ticks += 1;
        market_events += rx.try_iter().filter(Event::is_market).count();
    }

    println!();
    println!("=== Replay ===");
    println!("Ticks:          {ticks}");
    println!("Market events:  {market_events}");
    if let Some(symbol) = source.exhausted_by() {
        println!("Exhausted by:   {symbol}");
    }
    if let Some(fingerprint) = source.fingerprint() {
        println!("Fingerprint:    {fingerprint}");
    }
    println!();
    println!(
        "{:<8} {:<20} {:>10} {:>10} {:>10} {:>10} {:>12}",
        "Symbol", "Timestamp", "Open", "High", "Low", "Close", "Volume"
    );
    println!("{}", "-".repeat(86));
    for symbol in source.symbols() {
        match source.latest_bar(symbol)? {
            Some(bar) => println!(
                "{:<8} {:<20} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12.0}",
                symbol,
                bar.timestamp.to_string(),
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            ),
            None => println!("{symbol:<8} (no bars yet)"),
        }
    }
    Ok(())
}

fn run_cache_status(symbols: &[String], frequency: Frequency, cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = CsvCache::new(cache_dir);
    let rows = cache.status(symbols, frequency);

    println!("Cache: {} ({frequency})", cache_dir.display());
    println!();
    println!("{:<8} {:<42} {:>10}", "Symbol", "Range", "Rows");
    println!("{}", "-".repeat(62));
    for row in &rows {
        match (row.cached, row.first, row.last) {
            (true, Some(first), Some(last)) => println!(
                "{:<8} {:<42} {:>10}",
                row.symbol,
                format!("{first} to {last}"),
                row.row_count.unwrap_or(0)
            ),
            _ => println!("{:<8} {:<42} {:>10}", row.symbol, "(not cached)", "-"),
        }
    }
    Ok(())
}
