//! Quarterly fundamentals from Financial Modeling Prep.
//!
//! Discounted-cash-flow history and financial-growth history are fetched
//! separately and inner-joined on the report date. Results are cached at
//! `{root}/fundamental/quarterly/{SYMBOL}.csv`.

use super::cache::{quarantine, write_atomic, CsvCache};
use super::http::{Reply, VendorClient};
use super::provider::DataError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One quarter's valuation and growth figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRecord {
    pub date: NaiveDate,
    pub dcf: f64,
    pub revenue_growth: Option<f64>,
    pub five_y_revenue_growth_per_share: Option<f64>,
    pub five_y_net_income_growth_per_share: Option<f64>,
    pub asset_growth: Option<f64>,
    pub book_value_per_share_growth: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DcfRow {
    date: NaiveDate,
    dcf: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrowthRow {
    date: NaiveDate,
    revenue_growth: Option<f64>,
    five_y_revenue_growth_per_share: Option<f64>,
    five_y_net_income_growth_per_share: Option<f64>,
    asset_growth: Option<f64>,
    // FMP spells this one with a lowercase "per".
    #[serde(rename = "bookValueperShareGrowth")]
    book_value_per_share_growth: Option<f64>,
}

/// Inner join on date, oldest first.
fn join(dcf: Vec<DcfRow>, growth: Vec<GrowthRow>) -> Vec<FundamentalRecord> {
    let by_date: HashMap<NaiveDate, GrowthRow> = growth.into_iter().map(|g| (g.date, g)).collect();
    let mut records: Vec<FundamentalRecord> = dcf
        .into_iter()
        .filter_map(|d| {
            let g = by_date.get(&d.date)?;
            Some(FundamentalRecord {
                date: d.date,
                dcf: d.dcf,
                revenue_growth: g.revenue_growth,
                five_y_revenue_growth_per_share: g.five_y_revenue_growth_per_share,
                five_y_net_income_growth_per_share: g.five_y_net_income_growth_per_share,
                asset_growth: g.asset_growth,
                book_value_per_share_growth: g.book_value_per_share_growth,
            })
        })
        .collect();
    records.sort_by_key(|r| r.date);
    records.dedup_by_key(|r| r.date);
    records
}

pub struct FmpFundamentals {
    client: VendorClient,
    base_url: String,
    api_key: String,
    cache: Option<CsvCache>,
}

impl FmpFundamentals {
    pub fn new(
        client: VendorClient,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        cache: Option<CsvCache>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            cache,
        }
    }

    fn cache_path(&self, symbol: &str) -> Option<PathBuf> {
        self.cache.as_ref().map(|c| {
            c.root()
                .join("fundamental")
                .join("quarterly")
                .join(format!("{symbol}.csv"))
        })
    }

    /// Fetch and join both histories. `Ok(None)` when either is unavailable
    /// or the join is empty.
    pub fn fetch(&self, symbol: &str) -> Result<Option<Vec<FundamentalRecord>>, DataError> {
        let query = [
            ("period", "quarter".to_string()),
            ("apikey", self.api_key.clone()),
        ];

        let dcf_url = format!(
            "{}/api/v3/historical-daily-discounted-cash-flow/{}",
            self.base_url, symbol
        );
        let dcf = match self.client.get_json::<Vec<DcfRow>>(&dcf_url, &query, &[])? {
            Reply::Body(rows) => rows,
            Reply::Absent(reason) => {
                debug!(symbol, %reason, "no dcf history");
                return Ok(None);
            }
        };

        let growth_url = format!("{}/api/v3/financial-growth/{}", self.base_url, symbol);
        let growth = match self.client.get_json::<Vec<GrowthRow>>(&growth_url, &query, &[])? {
            Reply::Body(rows) => rows,
            Reply::Absent(reason) => {
                debug!(symbol, %reason, "no growth history");
                return Ok(None);
            }
        };

        let records = join(dcf, growth);
        Ok((!records.is_empty()).then_some(records))
    }

    /// Cache first unless `refresh`; a vendor result is written back.
    pub fn load(&self, symbol: &str, refresh: bool) -> Result<Option<Vec<FundamentalRecord>>, DataError> {
        if !refresh {
            if let Some(records) = self.read_cached(symbol) {
                return Ok(Some(records));
            }
        }

        let fetched = self.fetch(symbol)?;
        if let (Some(records), Some(path)) = (&fetched, self.cache_path(symbol)) {
            if let Err(e) = write_records(&path, records) {
                warn!(symbol, error = %e, "fundamentals cache write failed");
            }
        }
        Ok(fetched)
    }

    fn read_cached(&self, symbol: &str) -> Option<Vec<FundamentalRecord>> {
        let path = self.cache_path(symbol)?;
        if !path.exists() {
            return None;
        }
        let parsed: Result<Vec<FundamentalRecord>, csv::Error> = csv::Reader::from_path(&path)
            .and_then(|mut r| r.deserialize().collect());
        match parsed {
            Ok(records) if !records.is_empty() => Some(records),
            Ok(_) => {
                quarantine(&path, "no rows");
                None
            }
            Err(e) => {
                quarantine(&path, &e.to_string());
                None
            }
        }
    }
}

fn write_records(path: &std::path::Path, records: &[FundamentalRecord]) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| DataError::Cache(format!("flush csv: {e}")))?;
    write_atomic(path, &bytes)
}
