//! Blocking HTTP client shared by the vendor adapters.
//!
//! Handles timeouts, retries with exponential backoff, the circuit breaker,
//! and the mapping of HTTP outcomes onto [`Reply`]:
//! - transport failure (connect, timeout) → retried, then `Err`
//! - 429 → retried, then `Err(RateLimited)`
//! - 5xx → retried, then `Reply::Absent(HttpStatus)`
//! - 403 → `Reply::Absent(HttpStatus)`, counted against the breaker
//! - other non-2xx → `Reply::Absent(HttpStatus)` immediately
//! - 2xx with an unparseable body → `Reply::Absent(Malformed)`

use super::circuit_breaker::CircuitBreaker;
use super::provider::{AbsentReason, DataError, FetchOutcome};
use crate::config::HttpConfig;
use crate::domain::BarRecord;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// A decoded response body, or the reason there isn't one.
#[derive(Debug)]
pub enum Reply<T> {
    Body(T),
    Absent(AbsentReason),
}

impl<T> Reply<T> {
    /// Normalize a body into bars; anything absent stays absent.
    ///
    /// Rows with negative, non-finite or inverted prices are dropped. A body
    /// with nothing but such rows is `Malformed`.
    pub fn into_outcome<F>(self, symbol: &str, normalize: F) -> FetchOutcome
    where
        F: FnOnce(T) -> Result<Vec<BarRecord>, AbsentReason>,
    {
        let bars = match self {
            Reply::Body(body) => match normalize(body) {
                Ok(bars) => bars,
                Err(reason) => return FetchOutcome::Absent(reason),
            },
            Reply::Absent(reason) => return FetchOutcome::Absent(reason),
        };

        let received = bars.len();
        let sane: Vec<BarRecord> = bars.into_iter().filter(BarRecord::is_sane).collect();
        if sane.len() < received {
            warn!(symbol, dropped = received - sane.len(), "dropped bars failing OHLCV sanity check");
            if sane.is_empty() {
                return FetchOutcome::Absent(AbsentReason::Malformed(format!(
                    "all {received} bars failed the OHLCV sanity check"
                )));
            }
        }
        FetchOutcome::from_bars(symbol, sane)
    }
}

/// Cloneable client: clones share the connection pool and circuit breaker.
#[derive(Debug, Clone)]
pub struct VendorClient {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl VendorClient {
    pub fn new(config: &HttpConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("barfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            breaker: Arc::new(CircuitBreaker::new(
                config.breaker_threshold,
                Duration::from_secs(config.breaker_cooldown_secs),
            )),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// GET `url` and decode a JSON body into `T`.
    ///
    /// `query` and `headers` are kept out of log lines and error messages
    /// since they carry API keys.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<Reply<T>, DataError> {
        if !self.breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let mut last_error = None;
        let mut last_status = None;
        let mut retry_after = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.backoff(attempt));
            }

            if !self.breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            debug!(url, attempt, "vendor GET");
            let mut request = self.client.get(url).query(query);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        retry_after = Some(
                            resp.headers()
                                .get(reqwest::header::RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.trim().parse::<u64>().ok())
                                .unwrap_or(60),
                        );
                        last_status = Some(status.as_u16());
                        continue;
                    }

                    if status.is_server_error() {
                        retry_after = None;
                        last_status = Some(status.as_u16());
                        continue;
                    }

                    if status == StatusCode::FORBIDDEN {
                        warn!(url, "vendor answered 403");
                        self.breaker.record_failure();
                        return Ok(Reply::Absent(AbsentReason::HttpStatus(403)));
                    }

                    self.breaker.record_success();

                    if !status.is_success() {
                        debug!(url, status = status.as_u16(), "vendor answered non-2xx");
                        return Ok(Reply::Absent(AbsentReason::HttpStatus(status.as_u16())));
                    }

                    let body = resp.text().map_err(|e| {
                        DataError::NetworkUnreachable(format!(
                            "reading body from {url}: {}",
                            e.without_url()
                        ))
                    })?;

                    return Ok(match serde_json::from_str::<T>(&body) {
                        Ok(value) => Reply::Body(value),
                        Err(e) => Reply::Absent(AbsentReason::Malformed(e.to_string())),
                    });
                }
                Err(e) => {
                    let e = e.without_url();
                    if e.is_connect() || e.is_timeout() {
                        last_status = None;
                        retry_after = None;
                        last_error = Some(DataError::NetworkUnreachable(format!("{url}: {e}")));
                        continue;
                    }
                    self.breaker.record_failure();
                    return Err(DataError::NetworkUnreachable(format!("{url}: {e}")));
                }
            }
        }

        // One failure per exhausted call, however many attempts it took.
        if let Some(retry_after_secs) = retry_after {
            self.breaker.record_failure();
            return Err(DataError::RateLimited { retry_after_secs });
        }
        match (last_status, last_error) {
            (Some(code), _) => Ok(Reply::Absent(AbsentReason::HttpStatus(code))),
            (None, Some(e)) => {
                self.breaker.record_failure();
                Err(e)
            }
            (None, None) => Err(DataError::NetworkUnreachable(format!("{url}: no response"))),
        }
    }

    /// Delay before retry `attempt` (1-based): doubles each time, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: i32,
    }

    fn client(max_retries: u32) -> VendorClient {
        let config = HttpConfig {
            timeout_secs: 5,
            max_retries,
            retry_base_delay_ms: 1,
            ..HttpConfig::default()
        };
        VendorClient::new(&config).unwrap()
    }

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> BarRecord {
        BarRecord {
            symbol: "AAA".into(),
            timestamp: chrono::NaiveDate::from_ymd_opt(2020, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn insane_bars_are_dropped() {
        let rows = vec![
            bar(2, 1.0, 2.0, 0.5, 1.5),
            bar(3, -1.0, 2.0, 0.5, 1.5),
            bar(6, f64::NAN, 2.0, 0.5, 1.5),
            bar(7, 1.0, 0.5, 2.0, 1.5),
        ];
        match Reply::Body(rows).into_outcome("AAA", Ok) {
            FetchOutcome::Series(series) => {
                assert_eq!(series.len(), 1);
                assert_eq!(series.bars()[0].close, 1.5);
            }
            FetchOutcome::Absent(reason) => panic!("expected a series, got {reason}"),
        }
    }

    #[test]
    fn body_of_only_insane_bars_is_malformed() {
        let rows = vec![bar(2, 1.0, 2.0, 0.5, -1.5)];
        let outcome = Reply::Body(rows).into_outcome("AAA", Ok);
        assert!(matches!(outcome, FetchOutcome::Absent(AbsentReason::Malformed(_))));
    }

    #[test]
    fn decodes_json_body() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/ok")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"value": 7}"#)
            .create();

        let url = format!("{}/ok", server.url());
        match client(0).get_json::<Payload>(&url, &[("token", "k".into())], &[]).unwrap() {
            Reply::Body(p) => assert_eq!(p, Payload { value: 7 }),
            Reply::Absent(r) => panic!("expected body, got {r}"),
        }
    }

    #[test]
    fn not_found_is_absent() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/missing").with_status(404).create();

        let url = format!("{}/missing", server.url());
        match client(2).get_json::<Payload>(&url, &[], &[]).unwrap() {
            Reply::Absent(reason) => assert_eq!(reason, AbsentReason::HttpStatus(404)),
            Reply::Body(_) => panic!("expected absent"),
        }
    }

    #[test]
    fn malformed_body_is_absent() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/garbage")
            .with_status(200)
            .with_body("<html>nope</html>")
            .create();

        let url = format!("{}/garbage", server.url());
        let reply = client(0).get_json::<Payload>(&url, &[], &[]).unwrap();
        assert!(matches!(reply, Reply::Absent(AbsentReason::Malformed(_))));
    }

    #[test]
    fn server_error_is_retried_then_absent() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create();

        let url = format!("{}/flaky", server.url());
        let reply = client(2).get_json::<Payload>(&url, &[], &[]).unwrap();
        assert!(matches!(reply, Reply::Absent(AbsentReason::HttpStatus(503))));
        m.assert();
    }

    #[test]
    fn rate_limit_surfaces_as_error() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "12")
            .create();

        let url = format!("{}/busy", server.url());
        let result = client(0).get_json::<Payload>(&url, &[], &[]);
        assert!(matches!(
            result,
            Err(DataError::RateLimited {
                retry_after_secs: 12
            })
        ));
    }

    #[test]
    fn forbidden_is_absent_without_blocking_other_requests() {
        let mut server = mockito::Server::new();
        let _denied = server.mock("GET", "/denied").with_status(403).create();
        let _ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body(r#"{"value": 1}"#)
            .create();

        let c = client(0);
        let denied = format!("{}/denied", server.url());
        let reply = c.get_json::<Payload>(&denied, &[], &[]).unwrap();
        assert!(matches!(reply, Reply::Absent(AbsentReason::HttpStatus(403))));
        assert!(c.breaker().is_allowed());

        let ok = format!("{}/ok", server.url());
        assert!(matches!(
            c.get_json::<Payload>(&ok, &[], &[]).unwrap(),
            Reply::Body(Payload { value: 1 })
        ));
    }

    #[test]
    fn repeated_forbidden_trips_breaker() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/denied").with_status(403).create();

        let c = client(0);
        let url = format!("{}/denied", server.url());
        for _ in 0..3 {
            c.get_json::<Payload>(&url, &[], &[]).unwrap();
        }
        assert!(!c.breaker().is_allowed());
    }

    #[test]
    fn retries_count_as_one_failure() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "1")
            .expect(4)
            .create();

        // threshold 3, four attempts: still one failed call
        let c = client(3);
        let url = format!("{}/busy", server.url());
        let result = c.get_json::<Payload>(&url, &[], &[]);
        assert!(matches!(result, Err(DataError::RateLimited { .. })));
        assert!(c.breaker().is_allowed());
        m.assert();
    }

    #[test]
    fn backoff_is_capped() {
        let c = client(64);
        assert_eq!(c.backoff(1), Duration::from_millis(1));
        assert_eq!(c.backoff(3), Duration::from_millis(4));
        assert_eq!(c.backoff(64), MAX_RETRY_DELAY);
    }

    #[test]
    fn unreachable_host_is_an_error() {
        // Port 1 on loopback refuses connections.
        let result = client(0).get_json::<Payload>("http://127.0.0.1:1/x", &[], &[]);
        assert!(matches!(result, Err(DataError::NetworkUnreachable(_))));
    }

    #[test]
    fn tripped_breaker_refuses_requests() {
        let c = client(0);
        c.breaker().trip();
        let result = c.get_json::<Payload>("http://127.0.0.1:1/x", &[], &[]);
        assert!(matches!(result, Err(DataError::CircuitBreakerTripped)));
    }
}
