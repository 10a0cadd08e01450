//! CSV cache of normalized bar series.
//!
//! Layout: `{root}/{frequency}/{SYMBOL}.csv` with a `{SYMBOL}.meta.json`
//! sidecar next to each file.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Append merges cached and fresh rows, fresh rows winning on collision
//! - Tolerant reader: `date` accepted for `datetime`, extra vendor columns ignored
//! - Quarantine for unreadable files ({filename}.quarantined), treated as a miss
//! - Metadata sidecar per entry (hash, range, row count)

use super::provider::DataError;
use crate::domain::timestamp::{format_timestamp, parse_timestamp};
use crate::domain::{BarRecord, Frequency, SymbolSeries};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER: [&str; 6] = ["datetime", "open", "high", "low", "close", "volume"];

/// Metadata sidecar for a cached series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub frequency: Frequency,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
    pub row_count: usize,
    /// BLAKE3 of the CSV bytes on disk.
    pub data_hash: String,
    pub cached_at: NaiveDateTime,
}

/// Cache status for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub row_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date")]
    datetime: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// The CSV cache.
#[derive(Debug, Clone)]
pub struct CsvCache {
    root: PathBuf,
}

impl CsvCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn frequency_dir(&self, frequency: Frequency) -> PathBuf {
        self.root.join(frequency.as_str())
    }

    /// Path to the CSV file for a symbol: `{root}/{frequency}/{SYMBOL}.csv`
    pub fn data_path(&self, symbol: &str, frequency: Frequency) -> PathBuf {
        self.frequency_dir(frequency).join(format!("{symbol}.csv"))
    }

    fn meta_path(&self, symbol: &str, frequency: Frequency) -> PathBuf {
        self.frequency_dir(frequency)
            .join(format!("{symbol}.meta.json"))
    }

    /// Load a cached series. `Ok(None)` is a miss.
    ///
    /// A file that exists but cannot be parsed is renamed aside and reported
    /// as a miss so the caller re-downloads it.
    pub fn load(&self, symbol: &str, frequency: Frequency) -> Result<Option<SymbolSeries>, DataError> {
        check_symbol(symbol)?;
        let path = self.data_path(symbol, frequency);
        if !path.exists() {
            return Ok(None);
        }

        match read_bars(symbol, &path) {
            Ok(bars) if !bars.is_empty() => {
                debug!(symbol, %frequency, rows = bars.len(), "cache hit");
                Ok(Some(SymbolSeries::new(symbol, bars)))
            }
            Ok(_) => {
                quarantine(&path, "no rows");
                Ok(None)
            }
            Err(e) => {
                quarantine(&path, &e.to_string());
                Ok(None)
            }
        }
    }

    /// Write a series, replacing any cached copy.
    pub fn save(&self, symbol: &str, frequency: Frequency, series: &SymbolSeries) -> Result<(), DataError> {
        check_symbol(symbol)?;
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Err(DataError::Cache(format!("no bars to cache for {symbol}")));
        };

        fs::create_dir_all(self.frequency_dir(frequency))?;

        let bytes = encode_bars(series.bars())?;
        let path = self.data_path(symbol, frequency);
        write_atomic(&path, &bytes)?;

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            frequency,
            first: first.timestamp,
            last: last.timestamp,
            row_count: series.len(),
            data_hash: blake3::hash(&bytes).to_hex().to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;
        write_atomic(&self.meta_path(symbol, frequency), &meta_json)?;

        debug!(symbol, %frequency, rows = series.len(), "cache write");
        Ok(())
    }

    /// Merge `fresh` into the cached series, save, and return the merged result.
    pub fn append(
        &self,
        symbol: &str,
        frequency: Frequency,
        fresh: &SymbolSeries,
    ) -> Result<SymbolSeries, DataError> {
        let merged = match self.load(symbol, frequency)? {
            Some(existing) => existing.merge(fresh.clone()),
            None => fresh.clone(),
        };
        if !merged.is_empty() {
            self.save(symbol, frequency, &merged)?;
        }
        Ok(merged)
    }

    pub fn meta(&self, symbol: &str, frequency: Frequency) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol, frequency)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Which symbols are cached at `frequency`, and their ranges.
    pub fn status(&self, symbols: &[String], frequency: Frequency) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self
                    .meta(sym, frequency)
                    .filter(|_| self.data_path(sym, frequency).exists());
                CacheStatus {
                    symbol: sym.clone(),
                    cached: meta.is_some(),
                    first: meta.as_ref().map(|m| m.first),
                    last: meta.as_ref().map(|m| m.last),
                    row_count: meta.as_ref().map(|m| m.row_count),
                }
            })
            .collect()
    }
}

fn check_symbol(symbol: &str) -> Result<(), DataError> {
    if symbol.is_empty() || symbol.contains(['/', '\\']) || symbol.contains("..") {
        return Err(DataError::Cache(format!("invalid symbol '{symbol}'")));
    }
    Ok(())
}

fn read_bars(symbol: &str, path: &Path) -> Result<Vec<BarRecord>, DataError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut bars = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        let timestamp =
            parse_timestamp(&row.datetime).ok_or(DataError::InvalidTimestamp(row.datetime))?;
        bars.push(BarRecord {
            symbol: symbol.to_string(),
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(bars)
}

fn encode_bars(bars: &[BarRecord]) -> Result<Vec<u8>, DataError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for bar in bars {
        writer.write_record([
            format_timestamp(bar.timestamp),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| DataError::Cache(format!("flush csv: {e}")))
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DataError::Cache(format!("atomic rename failed for {}: {e}", path.display()))
    })
}

pub(crate) fn quarantine(path: &Path, reason: &str) {
    let mut target = path.as_os_str().to_owned();
    target.push(".quarantined");
    warn!(path = %path.display(), reason, "quarantining unreadable cache file");
    if let Err(e) = fs::rename(path, PathBuf::from(target)) {
        warn!(path = %path.display(), error = %e, "quarantine rename failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn bar(day: u32, close: f64, volume: f64) -> BarRecord {
        BarRecord {
            symbol: "SPY".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume,
        }
    }

    fn sample() -> SymbolSeries {
        SymbolSeries::new("SPY", vec![bar(2, 101.0, 1000.0), bar(3, 102.25, 1100.0)])
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());

        cache.save("SPY", Frequency::Daily, &sample()).unwrap();
        let loaded = cache.load("SPY", Frequency::Daily).unwrap().unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn writes_expected_layout_and_header() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        cache.save("SPY", Frequency::Daily, &sample()).unwrap();

        let path = dir.path().join("daily").join("SPY.csv");
        let text = fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("datetime,open,high,low,close,volume"));
        assert_eq!(lines.next(), Some("2024-01-02,100,102,99,101,1000"));
        assert!(!dir.path().join("daily").join("SPY.csv.tmp").exists());
    }

    #[test]
    fn intraday_rows_keep_time_of_day() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        let mut b = bar(2, 10.0, 5.0);
        b.timestamp = b.timestamp + chrono::Duration::minutes(9 * 60 + 35);
        let series = SymbolSeries::new("SPY", vec![b.clone()]);

        cache.save("SPY", Frequency::Minute5, &series).unwrap();
        let text = fs::read_to_string(cache.data_path("SPY", Frequency::Minute5)).unwrap();
        assert!(text.contains("2024-01-02 09:35:00"));
        let loaded = cache.load("SPY", Frequency::Minute5).unwrap().unwrap();
        assert_eq!(loaded.bars()[0].timestamp, b.timestamp);
    }

    #[test]
    fn missing_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        assert!(cache.load("QQQ", Frequency::Daily).unwrap().is_none());
    }

    #[test]
    fn reads_date_header_and_ignores_extra_columns() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        fs::create_dir_all(dir.path().join("daily")).unwrap();
        fs::write(
            cache.data_path("AAA", Frequency::Daily),
            "date,open,high,low,close,adjClose,volume\n\
             2020-01-03,2,2,2,2,1.9,20\n\
             2020-01-02,1,1,1,1,0.9,10\n",
        )
        .unwrap();

        let loaded = cache.load("AAA", Frequency::Daily).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.bars()[0].close, 1.0);
        assert_eq!(loaded.bars()[1].volume, 20.0);
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        fs::create_dir_all(dir.path().join("daily")).unwrap();
        let path = cache.data_path("BAD", Frequency::Daily);
        fs::write(&path, "datetime,open,high,low,close,volume\nnot-a-date,x,1,1,1,1\n").unwrap();

        assert!(cache.load("BAD", Frequency::Daily).unwrap().is_none());
        assert!(!path.exists());
        assert!(dir.path().join("daily").join("BAD.csv.quarantined").exists());
    }

    #[test]
    fn append_merges_with_fresh_rows_winning() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        cache.save("SPY", Frequency::Daily, &sample()).unwrap();

        let fresh = SymbolSeries::new("SPY", vec![bar(3, 200.0, 1.0), bar(4, 103.0, 1200.0)]);
        let merged = cache.append("SPY", Frequency::Daily, &fresh).unwrap();

        let closes: Vec<f64> = merged.bars().iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![101.0, 200.0, 103.0]);
        assert_eq!(cache.load("SPY", Frequency::Daily).unwrap().unwrap(), merged);
    }

    #[test]
    fn append_on_miss_saves_fresh() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        let merged = cache.append("SPY", Frequency::Daily, &sample()).unwrap();
        assert_eq!(merged, sample());
        assert!(cache.meta("SPY", Frequency::Daily).is_some());
    }

    #[test]
    fn save_rejects_empty_series() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        assert!(cache
            .save("SPY", Frequency::Daily, &SymbolSeries::empty("SPY"))
            .is_err());
    }

    #[test]
    fn rejects_path_like_symbols() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        assert!(cache.load("../etc", Frequency::Daily).is_err());
    }

    #[test]
    fn meta_and_status() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCache::new(dir.path());
        cache.save("SPY", Frequency::Daily, &sample()).unwrap();

        let meta = cache.meta("SPY", Frequency::Daily).unwrap();
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.first, bar(2, 0.0, 0.0).timestamp);
        let bytes = fs::read(cache.data_path("SPY", Frequency::Daily)).unwrap();
        assert_eq!(meta.data_hash, blake3::hash(&bytes).to_hex().to_string());

        let statuses = cache.status(&["SPY".into(), "QQQ".into()], Frequency::Daily);
        assert!(statuses[0].cached);
        assert_eq!(statuses[0].row_count, Some(2));
        assert!(!statuses[1].cached);
    }
}
