//! Stream patterns and routing entries
//!
//! The discovery service answers with one [`RouteEntry`] per data center, each
//! listing the fine-grained [`StreamPattern`]s it holds. Field names on the wire
//! are the abbreviated FDSN ones (`net`, `sta`, `loc`, `cha`, `start`, `end`).

use crate::time::{parse_fdsn_time, TimeWindow};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Wildcard marker matching any code
pub const WILDCARD: &str = "*";

fn wildcard() -> String {
    WILDCARD.to_string()
}

/// One network/station/location/channel selector with an optional epoch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPattern {
    #[serde(rename = "net", default = "wildcard")]
    pub network: String,
    #[serde(rename = "sta", default = "wildcard")]
    pub station: String,
    #[serde(rename = "loc", default = "wildcard")]
    pub location: String,
    #[serde(rename = "cha", default = "wildcard")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl StreamPattern {
    /// Pattern with no epoch
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
            start: None,
            end: None,
        }
    }

    /// Same pattern restricted to an epoch
    pub fn with_epoch(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start = start.map(str::to_string);
        self.end = end.map(str::to_string);
        self
    }

    pub fn is_wildcard_station(&self) -> bool {
        self.station == WILDCARD
    }

    /// Individual network codes (merged patterns hold comma-joined lists)
    pub fn networks(&self) -> impl Iterator<Item = &str> {
        split_codes(&self.network)
    }

    /// Individual station codes (merged patterns hold comma-joined lists)
    pub fn stations(&self) -> impl Iterator<Item = &str> {
        split_codes(&self.station)
    }

    /// Parsed epoch start; unparseable or blank values count as absent
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        non_blank(&self.start).and_then(|s| parse_fdsn_time(s).ok())
    }

    /// Parsed epoch end; unparseable or blank values count as absent
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        non_blank(&self.end).and_then(|s| parse_fdsn_time(s).ok())
    }

    /// Calendar year of the epoch start, if known
    pub fn start_year(&self) -> Option<i32> {
        self.start_time().map(|t| t.year())
    }

    /// The epoch as a window, when both ends are present
    pub fn window(&self) -> Option<TimeWindow> {
        Some(TimeWindow::new(self.start_time()?, self.end_time()?))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn split_codes(codes: &str) -> impl Iterator<Item = &str> {
    codes.split(',').map(str::trim).filter(|c| !c.is_empty())
}

/// One backend's raw, unbundled matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub url: String,
    #[serde(default)]
    pub params: Vec<StreamPattern>,
}

/// One backend's patterns after bundling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledRoute {
    pub url: String,
    pub patterns: Vec<StreamPattern>,
}
