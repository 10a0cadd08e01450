//! Serializable feed configuration and vendor credentials.

use crate::domain::Frequency;
use crate::source::SourceError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which vendor a source is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Tiingo archive, cached locally, always replayed.
    HistoricArchive,
    /// Alpaca market data.
    BrokerageLive,
    /// TD Ameritrade price history.
    BrokeragePolled,
    /// Financial Modeling Prep, optionally with quarterly fundamentals.
    FundamentalsPolled,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::HistoricArchive => "historic_archive",
            SourceKind::BrokerageLive => "brokerage_live",
            SourceKind::BrokeragePolled => "brokerage_polled",
            SourceKind::FundamentalsPolled => "fundamentals_polled",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replay a fixed history, or re-poll the vendor on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    #[default]
    Backtest,
    Live,
}

/// HTTP client settings shared by all vendor adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
    pub tiingo_url: String,
    pub alpaca_data_url: String,
    pub tda_url: String,
    pub fmp_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            breaker_threshold: 3,
            breaker_cooldown_secs: 30 * 60,
            tiingo_url: "https://api.tiingo.com".into(),
            alpaca_data_url: "https://data.alpaca.markets".into(),
            tda_url: "https://api.tdameritrade.com".into(),
            fmp_url: "https://financialmodelingprep.com".into(),
        }
    }
}

impl HttpConfig {
    /// Point every vendor at one base URL (a mock server in tests).
    pub fn with_base_url(mut self, url: &str) -> Self {
        let url = url.trim_end_matches('/').to_string();
        self.tiingo_url = url.clone();
        self.alpaca_data_url = url.clone();
        self.tda_url = url.clone();
        self.fmp_url = url;
        self
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_workers() -> usize {
    6
}

fn default_lookback_days() -> u32 {
    100
}

/// Everything needed to build a market data source.
///
/// ```toml
/// source = "historic_archive"
/// symbols = ["SPY", "QQQ"]
/// start = "2020-01-02"
/// frequency = "daily"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub source: SourceKind,

    #[serde(default)]
    pub mode: FeedMode,

    pub symbols: Vec<String>,

    /// First bar of the replay. Must exist in every symbol's daily history.
    #[serde(default)]
    pub start: Option<NaiveDate>,

    /// Exclusive upper bound of the replay.
    #[serde(default)]
    pub end: Option<NaiveDate>,

    #[serde(default)]
    pub frequency: Frequency,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Threads in the construction-time fetch pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Ignore cached series and re-download.
    #[serde(default)]
    pub refresh: bool,

    /// Calendar days re-polled on each live tick.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Load quarterly fundamentals and drop symbols without them.
    #[serde(default)]
    pub fundamentals: bool,

    #[serde(default)]
    pub http: HttpConfig,
}

impl FeedConfig {
    pub fn new(source: SourceKind, symbols: Vec<String>) -> Self {
        Self {
            source,
            mode: FeedMode::Backtest,
            symbols,
            start: None,
            end: None,
            frequency: Frequency::Daily,
            cache_dir: default_cache_dir(),
            workers: default_workers(),
            refresh: false,
            lookback_days: default_lookback_days(),
            fundamentals: false,
            http: HttpConfig::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbols must not be empty".into()));
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid("symbols must not be blank".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end <= start {
                return Err(ConfigError::Invalid(format!(
                    "end ({end}) must be after start ({start})"
                )));
            }
        }
        if self.mode == FeedMode::Live && self.source == SourceKind::HistoricArchive {
            return Err(ConfigError::Invalid(
                "historic_archive sources only replay; use mode = \"backtest\"".into(),
            ));
        }
        if self.mode == FeedMode::Backtest
            && self.start.is_none()
            && self.source != SourceKind::HistoricArchive
        {
            return Err(ConfigError::Invalid(format!(
                "{} backtests need a start date",
                self.source
            )));
        }
        if self.mode == FeedMode::Live && self.lookback_days == 0 {
            return Err(ConfigError::Invalid("lookback_days must be at least 1".into()));
        }
        Ok(())
    }
}

/// Vendor credentials, passed explicitly to the source builder.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub tiingo: Option<String>,
    pub fmp: Option<String>,
    pub alpaca_key_id: Option<String>,
    pub alpaca_secret_key: Option<String>,
    pub tda_consumer_key: Option<String>,
}

impl ApiKeys {
    /// Read credentials from the process environment. Blank values count as unset.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            tiingo: var("TIINGO_API"),
            fmp: var("FMP_API"),
            alpaca_key_id: var("alpaca_key_id"),
            alpaca_secret_key: var("alpaca_secret_key"),
            tda_consumer_key: var("TDD_consumer_key"),
        }
    }

    /// Borrow a credential or fail with the env var name that should hold it.
    pub fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, SourceError> {
        value
            .as_deref()
            .ok_or(SourceError::MissingCredential(name))
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ApiKeys")
            .field("tiingo", &redact(&self.tiingo))
            .field("fmp", &redact(&self.fmp))
            .field("alpaca_key_id", &redact(&self.alpaca_key_id))
            .field("alpaca_secret_key", &redact(&self.alpaca_secret_key))
            .field("tda_consumer_key", &redact(&self.tda_consumer_key))
            .finish()
    }
}
