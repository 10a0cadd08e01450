//! Bar frequency: the fixed set of resolutions a source can be configured for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bar resolution.
///
/// The string forms (`1min` … `daily`) are used in config files, on the
/// command line, and as cache directory names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "1min")]
    Minute1,
    #[serde(rename = "5min")]
    Minute5,
    #[serde(rename = "15min")]
    Minute15,
    #[serde(rename = "30min")]
    Minute30,
    #[serde(rename = "1hour")]
    Hour1,
    #[serde(rename = "4hour")]
    Hour4,
    #[serde(rename = "daily")]
    #[default]
    Daily,
}

impl Frequency {
    pub const ALL: [Frequency; 7] = [
        Frequency::Minute1,
        Frequency::Minute5,
        Frequency::Minute15,
        Frequency::Minute30,
        Frequency::Hour1,
        Frequency::Hour4,
        Frequency::Daily,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Minute1 => "1min",
            Frequency::Minute5 => "5min",
            Frequency::Minute15 => "15min",
            Frequency::Minute30 => "30min",
            Frequency::Hour1 => "1hour",
            Frequency::Hour4 => "4hour",
            Frequency::Daily => "daily",
        }
    }

    pub fn is_intraday(&self) -> bool {
        !matches!(self, Frequency::Daily)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown frequency '{0}' (expected one of 1min, 5min, 15min, 30min, 1hour, 4hour, daily)")]
pub struct ParseFrequencyError(pub String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseFrequencyError(s.to_string()))
    }
}
