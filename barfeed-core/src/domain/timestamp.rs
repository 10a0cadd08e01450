//! Timestamp parsing and formatting shared by the cache and vendor adapters.
//!
//! Every bar carries a `NaiveDateTime` in exchange wall-clock time
//! (America/New_York). Daily bars sit at midnight.

use super::Frequency;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;

/// Cache format for daily bars.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Cache format for intraday bars.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp string as written by the cache or returned by a vendor.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, and ISO 8601 date-times with
/// a `T` separator and optional zone suffix. A zone suffix is dropped and the
/// wall-clock time kept as written; use [`parse_exchange_timestamp`] when the
/// offset must be honoured.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(date.and_time(NaiveTime::MIN));
    }
    for fmt in [
        DATETIME_FORMAT,
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.naive_local())
}

/// Parse a zoned timestamp and convert it to exchange wall-clock time.
///
/// Strings without an offset are taken to already be exchange time.
pub fn parse_exchange_timestamp(raw: &str) -> Option<NaiveDateTime> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => Some(to_exchange_time(dt.with_timezone(&Utc))),
        Err(_) => parse_timestamp(raw),
    }
}

/// Convert epoch milliseconds to exchange wall-clock time.
pub fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(to_exchange_time)
}

/// Exchange midnight of `date` as epoch milliseconds.
pub fn to_epoch_millis(date: NaiveDate) -> Option<i64> {
    New_York
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Today's date on the exchange calendar.
pub fn exchange_today() -> NaiveDate {
    to_exchange_time(Utc::now()).date()
}

fn to_exchange_time(utc: DateTime<Utc>) -> NaiveDateTime {
    utc.with_timezone(&New_York).naive_local()
}

/// Snap a vendor timestamp onto the bar grid: daily bars lose their time of day.
pub fn session_timestamp(ts: NaiveDateTime, frequency: Frequency) -> NaiveDateTime {
    if frequency.is_intraday() {
        ts
    } else {
        ts.date().and_time(NaiveTime::MIN)
    }
}

/// Format a timestamp for the cache: date-only at midnight, date-time otherwise.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    if ts.time() == NaiveTime::MIN {
        ts.format(DATE_FORMAT).to_string()
    } else {
        ts.format(DATETIME_FORMAT).to_string()
    }
}
