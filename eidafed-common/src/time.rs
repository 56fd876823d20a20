//! FDSN time utilities
//!
//! Web-service times are always UTC. Clients send either a bare date
//! (`2000-01-01`) or a date-time (`2000-01-01T12:00:00[.ffffff]`), with or
//! without a trailing `Z`; the trailing marker is accepted but never required.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Output format used when forwarding times to backends
const FDSN_OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse an FDSN time string as UTC
pub fn parse_fdsn_time(input: &str) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    let stripped = trimmed.strip_suffix('Z').unwrap_or(trimmed);

    let parsed = if stripped.contains('T') {
        NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc())
    } else {
        NaiveDate::parse_from_str(stripped, "%Y-%m-%d")
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    };

    parsed.map_err(|_| Error::InvalidTime(input.to_string()))
}

/// Format a UTC instant the way backends expect it
pub fn format_fdsn_time(time: &DateTime<Utc>) -> String {
    time.format(FDSN_OUTPUT_FORMAT).to_string()
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Parse both bounds from FDSN strings
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(parse_fdsn_time(start)?, parse_fdsn_time(end)?))
    }

    /// True when the window contains no instant
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn start_param(&self) -> String {
        format_fdsn_time(&self.start)
    }

    pub fn end_param(&self) -> String {
        format_fdsn_time(&self.end)
    }
}
