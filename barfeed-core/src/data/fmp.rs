//! Financial Modeling Prep price adapter.
//!
//! Both endpoints answer newest-first; bars are reversed during
//! normalization. Intraday timestamps are already exchange wall-clock time.

use super::http::VendorClient;
use super::provider::{AbsentReason, DataError, FetchOutcome, FetchParams, VendorAdapter};
use crate::domain::timestamp::{parse_timestamp, session_timestamp, DATE_FORMAT};
use crate::domain::{BarRecord, Frequency};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct HistoricalPriceFull {
    #[serde(default)]
    historical: Vec<FmpBar>,
}

#[derive(Debug, Deserialize)]
struct FmpBar {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

pub struct FmpAdapter {
    client: VendorClient,
    base_url: String,
    api_key: String,
}

impl FmpAdapter {
    pub fn new(client: VendorClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

fn normalize(
    symbol: &str,
    mut rows: Vec<FmpBar>,
    frequency: Frequency,
) -> Result<Vec<BarRecord>, AbsentReason> {
    rows.reverse();
    rows.into_iter()
        .map(|row| {
            let ts = parse_timestamp(&row.date)
                .ok_or_else(|| AbsentReason::Malformed(format!("bad date '{}'", row.date)))?;
            Ok(BarRecord {
                symbol: symbol.to_string(),
                timestamp: session_timestamp(ts, frequency),
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            })
        })
        .collect()
}

impl VendorAdapter for FmpAdapter {
    fn name(&self) -> &str {
        "fmp"
    }

    fn supports(&self, _frequency: Frequency) -> bool {
        true
    }

    fn fetch_series(&self, symbol: &str, params: &FetchParams) -> Result<FetchOutcome, DataError> {
        let mut query = vec![("apikey", self.api_key.clone())];
        if let Some(start) = params.start {
            query.push(("from", start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = params.end {
            query.push(("to", end.format(DATE_FORMAT).to_string()));
        }

        debug!(symbol, frequency = %params.frequency, "fmp fetch");
        let frequency = params.frequency;
        if frequency.is_intraday() {
            let url = format!(
                "{}/api/v3/historical-chart/{}/{}",
                self.base_url,
                frequency.as_str(),
                symbol
            );
            let reply = self.client.get_json::<Vec<FmpBar>>(&url, &query, &[])?;
            Ok(reply.into_outcome(symbol, |rows| normalize(symbol, rows, frequency)))
        } else {
            let url = format!("{}/api/v3/historical-price-full/{}", self.base_url, symbol);
            let reply = self.client.get_json::<HistoricalPriceFull>(&url, &query, &[])?;
            Ok(reply.into_outcome(symbol, |full| normalize(symbol, full.historical, frequency)))
        }
    }
}
