//! Tiingo archive adapter.
//!
//! Daily history comes from the end-of-day endpoint, intraday from the IEX
//! endpoint resampled to the requested frequency. Both return oldest-first
//! arrays.

use super::http::VendorClient;
use super::provider::{AbsentReason, DataError, FetchOutcome, FetchParams, VendorAdapter};
use crate::domain::timestamp::{parse_exchange_timestamp, parse_timestamp, session_timestamp, DATE_FORMAT};
use crate::domain::{BarRecord, Frequency};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

/// Start date used when a full archive is requested.
pub fn archive_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Deserialize)]
struct TiingoBar {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

pub struct TiingoAdapter {
    client: VendorClient,
    base_url: String,
    token: String,
}

impl TiingoAdapter {
    pub fn new(client: VendorClient, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

// Daily dates are midnight UTC labels for the session, not instants, so they
// keep their wall-clock date. IEX bars are real UTC instants.
fn normalize(
    symbol: &str,
    rows: Vec<TiingoBar>,
    frequency: Frequency,
) -> Result<Vec<BarRecord>, AbsentReason> {
    rows.into_iter()
        .map(|row| {
            let ts = if frequency.is_intraday() {
                parse_exchange_timestamp(&row.date)
            } else {
                parse_timestamp(&row.date)
            }
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

impl VendorAdapter for TiingoAdapter {
    fn name(&self) -> &str {
        "tiingo"
    }

    fn supports(&self, _frequency: Frequency) -> bool {
        true
    }

    fn fetch_series(&self, symbol: &str, params: &FetchParams) -> Result<FetchOutcome, DataError> {
        let start = params.start.unwrap_or_else(archive_start);
        let mut query = vec![
            ("startDate", start.format(DATE_FORMAT).to_string()),
            ("token", self.token.clone()),
        ];
        if let Some(end) = params.end {
            query.push(("endDate", end.format(DATE_FORMAT).to_string()));
        }

        let url = if params.frequency.is_intraday() {
            query.push(("resampleFreq", params.frequency.as_str().to_string()));
            query.push(("columns", "open,high,low,close,volume".to_string()));
            format!("{}/iex/{}/prices", self.base_url, symbol)
        } else {
            format!("{}/tiingo/daily/{}/prices", self.base_url, symbol)
        };

        debug!(symbol, frequency = %params.frequency, %start, "tiingo fetch");
        let reply = self.client.get_json::<Vec<TiingoBar>>(&url, &query, &[])?;
        Ok(reply.into_outcome(symbol, |rows| normalize(symbol, rows, params.frequency)))
    }
}
