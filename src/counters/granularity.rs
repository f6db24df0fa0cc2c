//! Bucket widths and the bucket calculator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CounterError, CounterResult};

/// Width of the time buckets a counter is kept at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    /// A single bucket covering all time.
    All,
    Week,
    Day,
    Hour,
}

/// Every configured granularity, in the order the recorder applies them.
pub const GRANULARITIES: [Granularity; 4] = [
    Granularity::All,
    Granularity::Week,
    Granularity::Day,
    Granularity::Hour,
];

impl Granularity {
    /// Bucket width in seconds, `None` for [`Granularity::All`].
    pub const fn seconds(self) -> Option<i64> {
        match self {
            Granularity::All => None,
            Granularity::Week => Some(604_800),
            Granularity::Day => Some(86_400),
            Granularity::Hour => Some(3_600),
        }
    }

    /// Name used in table names and on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Granularity::All => "all",
            Granularity::Week => "604800",
            Granularity::Day => "86400",
            Granularity::Hour => "3600",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Granularity::All),
            "604800" | "week" => Ok(Granularity::Week),
            "86400" | "day" => Ok(Granularity::Day),
            "3600" | "hour" => Ok(Granularity::Hour),
            _ => Err(CounterError::InvalidGranularity(s.to_string())),
        }
    }
}

impl TryFrom<i64> for Granularity {
    type Error = CounterError;

    fn try_from(seconds: i64) -> Result<Self, Self::Error> {
        GRANULARITIES
            .into_iter()
            .find(|g| g.seconds() == Some(seconds))
            .ok_or_else(|| CounterError::InvalidGranularity(seconds.to_string()))
    }
}

impl TryFrom<String> for Granularity {
    type Error = CounterError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Granularity> for String {
    fn from(g: Granularity) -> Self {
        g.as_str().to_string()
    }
}

/// Start of the bucket containing `timestamp` at the given granularity.
///
/// Duration buckets are epoch-aligned: the result is the largest multiple of
/// the width not exceeding `timestamp`. [`Granularity::All`] always maps to 0.
pub fn bucket_for(granularity: Granularity, timestamp: i64) -> CounterResult<i64> {
    if timestamp < 0 {
        return Err(CounterError::InvalidTimestamp(timestamp));
    }

    Ok(match granularity.seconds() {
        None => 0,
        Some(width) => timestamp - timestamp % width,
    })
}
