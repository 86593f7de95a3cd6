//! Lookback windows selectable from the dashboard

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Row lookback used when the "all data" window is selected
pub const ALL_DATA_LOOKBACK_DAYS: i64 = 3650;

/// Upper bound on the number of days in the daily chart
pub const MAX_CHART_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeRange {
    Day,
    #[default]
    Week,
    Month,
    Quarter,
    HalfYear,
    Year,
    All,
}

impl TimeRange {
    /// Window length in days, `None` for the "all data" sentinel
    pub fn days(self) -> Option<i64> {
        match self {
            TimeRange::Day => Some(1),
            TimeRange::Week => Some(7),
            TimeRange::Month => Some(30),
            TimeRange::Quarter => Some(90),
            TimeRange::HalfYear => Some(180),
            TimeRange::Year => Some(365),
            TimeRange::All => None,
        }
    }

    pub fn lookback_days(self) -> i64 {
        self.days().unwrap_or(ALL_DATA_LOOKBACK_DAYS)
    }

    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.lookback_days())
    }

    /// Number of daily buckets in the time series
    pub fn chart_days(self) -> i64 {
        self.days()
            .map(|d| d.min(MAX_CHART_DAYS))
            .unwrap_or(MAX_CHART_DAYS)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported time range '{0}', expected one of 1d, 7d, 30d, 90d, 180d, 365d, all")]
pub struct InvalidTimeRange(String);

impl FromStr for TimeRange {
    type Err = InvalidTimeRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let days = normalized.strip_suffix('d').unwrap_or(&normalized);
        match days {
            "1" => Ok(TimeRange::Day),
            "7" => Ok(TimeRange::Week),
            "30" => Ok(TimeRange::Month),
            "90" => Ok(TimeRange::Quarter),
            "180" => Ok(TimeRange::HalfYear),
            "365" => Ok(TimeRange::Year),
            "all" => Ok(TimeRange::All),
            _ => Err(InvalidTimeRange(s.to_string())),
        }
    }
}

impl TryFrom<String> for TimeRange {
    type Error = InvalidTimeRange;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeRange> for String {
    fn from(range: TimeRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.days() {
            Some(days) => write!(f, "{days}d"),
            None => f.write_str("all"),
        }
    }
}
