//! TD Ameritrade price-history adapter.
//!
//! Candles carry epoch-millisecond timestamps. Minute frequencies map onto
//! `frequencyType=minute`; hourly bars are not offered by this endpoint.

use super::http::VendorClient;
use super::provider::{AbsentReason, DataError, FetchOutcome, FetchParams, VendorAdapter};
use crate::domain::timestamp::{from_epoch_millis, session_timestamp, to_epoch_millis};
use crate::domain::{BarRecord, Frequency};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PriceHistory {
    #[serde(default)]
    candles: Vec<Candle>,
    #[serde(default)]
    empty: bool,
}

#[derive(Debug, Deserialize)]
struct Candle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    datetime: i64,
}

/// `(periodType, frequencyType, frequency)` for a supported frequency.
fn period_spec(frequency: Frequency) -> Option<(&'static str, &'static str, u32)> {
    match frequency {
        Frequency::Minute1 => Some(("day", "minute", 1)),
        Frequency::Minute5 => Some(("day", "minute", 5)),
        Frequency::Minute15 => Some(("day", "minute", 15)),
        Frequency::Minute30 => Some(("day", "minute", 30)),
        Frequency::Daily => Some(("year", "daily", 1)),
        Frequency::Hour1 | Frequency::Hour4 => None,
    }
}

pub struct TdaAdapter {
    client: VendorClient,
    base_url: String,
    consumer_key: String,
}

impl TdaAdapter {
    pub fn new(client: VendorClient, base_url: impl Into<String>, consumer_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            consumer_key: consumer_key.into(),
        }
    }
}

fn normalize(
    symbol: &str,
    history: PriceHistory,
    frequency: Frequency,
) -> Result<Vec<BarRecord>, AbsentReason> {
    if history.empty {
        return Ok(Vec::new());
    }
    history
        .candles
        .into_iter()
        .map(|c| {
            let ts = from_epoch_millis(c.datetime)
                .ok_or_else(|| AbsentReason::Malformed(format!("bad epoch millis {}", c.datetime)))?;
            Ok(BarRecord {
                symbol: symbol.to_string(),
                timestamp: session_timestamp(ts, frequency),
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
        })
        .collect()
}

impl VendorAdapter for TdaAdapter {
    fn name(&self) -> &str {
        "td_ameritrade"
    }

    fn supports(&self, frequency: Frequency) -> bool {
        period_spec(frequency).is_some()
    }

    fn fetch_series(&self, symbol: &str, params: &FetchParams) -> Result<FetchOutcome, DataError> {
        let Some((period_type, frequency_type, frequency)) = period_spec(params.frequency) else {
            return Ok(FetchOutcome::Absent(AbsentReason::UnsupportedSymbol));
        };

        let mut query = vec![
            ("apikey", self.consumer_key.clone()),
            ("periodType", period_type.to_string()),
            ("frequencyType", frequency_type.to_string()),
            ("frequency", frequency.to_string()),
            ("needExtendedHoursData", "false".to_string()),
        ];
        let start_millis = params.start.and_then(to_epoch_millis);
        match start_millis {
            Some(ms) => query.push(("startDate", ms.to_string())),
            None => query.push(("period", "1".to_string())),
        }
        if let Some(ms) = params.end.and_then(to_epoch_millis) {
            query.push(("endDate", ms.to_string()));
        } else if start_millis.is_some() {
            let now_millis = chrono::Utc::now().timestamp_millis();
            query.push(("endDate", now_millis.to_string()));
        }

        let url = format!("{}/v1/marketdata/{}/pricehistory", self.base_url, symbol);
        debug!(symbol, frequency = %params.frequency, "tda fetch");
        let reply = self.client.get_json::<PriceHistory>(&url, &query, &[])?;
        Ok(reply.into_outcome(symbol, |history| normalize(symbol, history, params.frequency)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use chrono::NaiveDate;

    #[test]
    fn candles_convert_from_epoch_millis() {
        // 2021-01-04 06:00 UTC = 01:00 Eastern, snapped to the session date.
        let json = r#"{"candles":[
            {"open":1,"high":2,"low":0.5,"close":1.5,"volume":100,"datetime":1609740000000}
        ],"symbol":"AAA","empty":false}"#;
        let history: PriceHistory = serde_json::from_str(json).unwrap();
        let bars = normalize("AAA", history, Frequency::Daily).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(
            bars[0].timestamp,
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(bars[0].volume, 100.0);
    }

    #[test]
    fn empty_flag_yields_no_bars() {
        let history: PriceHistory =
            serde_json::from_str(r#"{"candles":[],"symbol":"ZZZ","empty":true}"#).unwrap();
        assert!(normalize("ZZZ", history, Frequency::Daily).unwrap().is_empty());
    }

    #[test]
    fn hourly_frequencies_are_unsupported() {
        let client = VendorClient::new(&HttpConfig::default()).unwrap();
        let adapter = TdaAdapter::new(client, "http://127.0.0.1:1", "key");
        assert!(!adapter.supports(Frequency::Hour1));
        assert!(adapter.supports(Frequency::Minute30));
        let outcome = adapter
            .fetch_series("AAA", &FetchParams::new(Frequency::Hour4))
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Absent(AbsentReason::UnsupportedSymbol));
    }

    #[test]
    fn sends_start_as_epoch_millis() {
        let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let millis = to_epoch_millis(start).unwrap();

        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/v1/marketdata/AAA/pricehistory")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("startDate".into(), millis.to_string()),
                mockito::Matcher::UrlEncoded("frequencyType".into(), "daily".into()),
                mockito::Matcher::UrlEncoded("apikey".into(), "key".into()),
            ]))
            .with_status(200)
            .with_body(format!(
                r#"{{"candles":[{{"open":1,"high":1,"low":1,"close":1,"volume":5,"datetime":{millis}}}],"empty":false}}"#
            ))
            .create();

        let client = VendorClient::new(&HttpConfig::default()).unwrap();
        let adapter = TdaAdapter::new(client, server.url(), "key");
        let outcome = adapter
            .fetch_series("AAA", &FetchParams::new(Frequency::Daily).starting(Some(start)))
            .unwrap();

        m.assert();
        assert!(matches!(outcome, FetchOutcome::Series(s) if s.len() == 1));
    }
}
