//! Alpaca market-data adapter.

use super::http::{Reply, VendorClient};
use super::provider::{AbsentReason, DataError, FetchOutcome, FetchParams, VendorAdapter};
use crate::domain::timestamp::{parse_exchange_timestamp, session_timestamp, DATE_FORMAT};
use crate::domain::{BarRecord, Frequency};
use serde::Deserialize;
use tracing::debug;

const PAGE_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

fn timeframe(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Minute1 => "1Min",
        Frequency::Minute5 => "5Min",
        Frequency::Minute15 => "15Min",
        Frequency::Minute30 => "30Min",
        Frequency::Hour1 => "1Hour",
        Frequency::Hour4 => "4Hour",
        Frequency::Daily => "1Day",
    }
}

pub struct AlpacaAdapter {
    client: VendorClient,
    data_url: String,
    key_id: String,
    secret_key: String,
}

impl AlpacaAdapter {
    pub fn new(
        client: VendorClient,
        data_url: impl Into<String>,
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            data_url: data_url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }
}

fn normalize(
    symbol: &str,
    rows: Vec<AlpacaBar>,
    frequency: Frequency,
) -> Result<Vec<BarRecord>, AbsentReason> {
    rows.into_iter()
        .map(|row| {
            let ts = parse_exchange_timestamp(&row.t)
                .ok_or_else(|| AbsentReason::Malformed(format!("bad timestamp '{}'", row.t)))?;
            Ok(BarRecord {
                symbol: symbol.to_string(),
                timestamp: session_timestamp(ts, frequency),
                open: row.o,
                high: row.h,
                low: row.l,
                close: row.c,
                volume: row.v,
            })
        })
        .collect()
}

impl VendorAdapter for AlpacaAdapter {
    fn name(&self) -> &str {
        "alpaca"
    }

    fn supports(&self, _frequency: Frequency) -> bool {
        true
    }

    fn fetch_series(&self, symbol: &str, params: &FetchParams) -> Result<FetchOutcome, DataError> {
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, symbol);
        let headers = [
            ("APCA-API-KEY-ID", self.key_id.as_str()),
            ("APCA-API-SECRET-KEY", self.secret_key.as_str()),
        ];
        let limit = params.limit.unwrap_or(PAGE_LIMIT).min(PAGE_LIMIT);

        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeframe", timeframe(params.frequency).to_string()),
                ("limit", limit.to_string()),
                ("adjustment", "raw".to_string()),
            ];
            if let Some(start) = params.start {
                query.push(("start", start.format(DATE_FORMAT).to_string()));
            }
            if let Some(end) = params.end {
                query.push(("end", end.format(DATE_FORMAT).to_string()));
            }
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            debug!(symbol, frequency = %params.frequency, page = page_token.is_some(), "alpaca fetch");
            match self.client.get_json::<BarsResponse>(&url, &query, &headers)? {
                Reply::Body(page) => {
                    rows.extend(page.bars.unwrap_or_default());
                    page_token = page.next_page_token.filter(|t| !t.is_empty());
                }
                Reply::Absent(reason) if rows.is_empty() => return Ok(FetchOutcome::Absent(reason)),
                // A later page failing still leaves a usable prefix.
                Reply::Absent(_) => break,
            }

            if page_token.is_none() || params.limit.is_some_and(|n| rows.len() >= n) {
                break;
            }
        }

        Ok(Reply::Body(rows).into_outcome(symbol, |rows| normalize(symbol, rows, params.frequency)))
    }
}
