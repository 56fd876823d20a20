//! Client query model
//!
//! Normalizes the parameters of one federated request. FDSN clients may use the
//! full parameter name or its abbreviation interchangeably (`network`/`net`,
//! `starttime`/`start`, ...); everything downstream sees canonical names only.
//! When both spellings are present the full name wins.

use crate::stream::WILDCARD;
use crate::time::TimeWindow;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Abbreviation → canonical parameter name
const ALIASES: [(&str, &str); 6] = [
    ("net", "network"),
    ("sta", "station"),
    ("loc", "location"),
    ("cha", "channel"),
    ("start", "starttime"),
    ("end", "endtime"),
];

fn canonical_key(key: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, full)| *full)
        .unwrap_or(key)
}

fn is_alias(key: &str) -> bool {
    ALIASES.iter().any(|(alias, _)| *alias == key)
}

/// Normalized parameters of one client request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    params: BTreeMap<String, String>,
    selectors: Vec<String>,
}

impl UserQuery {
    /// Build from decoded query-string pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            query.insert(key.as_ref(), value.into());
        }
        query
    }

    /// Build from a POST body: `key=value` lines are parameters, every other
    /// non-blank line is a stream selector.
    pub fn from_post_body(body: &str) -> Self {
        let mut query = Self::default();
        for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.split_once('=') {
                Some((key, value)) => query.insert(key.trim(), value.trim().to_string()),
                None => query.selectors.push(line.to_string()),
            }
        }
        query
    }

    fn insert(&mut self, key: &str, value: String) {
        let canonical = canonical_key(key);
        if is_alias(key) && self.params.contains_key(canonical) {
            return;
        }
        self.params.insert(canonical.to_string(), value);
    }

    /// Set a canonical parameter, replacing any previous value
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(canonical_key(key).to_string(), value.into());
    }

    /// Canonical value of a parameter; blank values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(canonical_key(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Every submitted parameter name (canonicalized)
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Raw selector lines from a POST body
    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn network(&self) -> Option<&str> {
        self.get("network")
    }

    pub fn station(&self) -> Option<&str> {
        self.get("station")
    }

    pub fn location(&self) -> Option<&str> {
        self.get("location")
    }

    pub fn channel(&self) -> Option<&str> {
        self.get("channel")
    }

    pub fn starttime(&self) -> Option<&str> {
        self.get("starttime")
    }

    pub fn endtime(&self) -> Option<&str> {
        self.get("endtime")
    }

    /// The requested time window, when both ends parse
    pub fn window(&self) -> Option<TimeWindow> {
        TimeWindow::parse(self.starttime()?, self.endtime()?).ok()
    }

    /// True when neither network nor station narrows the request
    pub fn is_catalog_wide(&self) -> bool {
        let open = |code: Option<&str>| code.map_or(true, |c| c == WILDCARD);
        self.selectors.is_empty() && open(self.network()) && open(self.station())
    }

    pub fn level(&self) -> Option<Level> {
        self.get("level").and_then(Level::parse)
    }

    pub fn format(&self) -> Option<Format> {
        self.get("format").and_then(Format::parse)
    }
}

/// Requested catalog detail level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Network,
    Station,
    Location,
    Channel,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Network, Level::Station, Level::Location, Level::Channel];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Network => "network",
            Level::Station => "station",
            Level::Location => "location",
            Level::Channel => "channel",
        }
    }
}

/// Catalog output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xml,
    Text,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Xml, Format::Text];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Xml => "xml",
            Format::Text => "text",
        }
    }
}

/// Time-series quality selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Data,
    Raw,
    QualityControlled,
    Modified,
    Best,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::Data,
        Quality::Raw,
        Quality::QualityControlled,
        Quality::Modified,
        Quality::Best,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Data => "D",
            Quality::Raw => "R",
            Quality::QualityControlled => "Q",
            Quality::Modified => "M",
            Quality::Best => "B",
        }
    }
}

/// One `NET STA LOC CHA START END` line of a POST body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub start: String,
    pub end: String,
}

impl Selector {
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [network, station, location, channel, start, end] = fields.as_slice() else {
            return Err(Error::validation("Invalid segment submitted."));
        };

        Ok(Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    /// Line as forwarded to the discovery service
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.network, self.station, self.location, self.channel, self.start, self.end
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviations_are_canonicalized() {
        let query = UserQuery::from_pairs([("net", "NL"), ("sta", "HGN"), ("start", "2000-01-01")]);
        assert_eq!(query.network(), Some("NL"));
        assert_eq!(query.station(), Some("HGN"));
        assert_eq!(query.starttime(), Some("2000-01-01"));
        assert!(query.keys().all(|k| k != "net" && k != "start"));
    }

    #[test]
    fn test_full_name_wins_over_abbreviation() {
        let query = UserQuery::from_pairs([("network", "NL"), ("net", "GE")]);
        assert_eq!(query.network(), Some("NL"));

        let query = UserQuery::from_pairs([("net", "GE"), ("network", "NL")]);
        assert_eq!(query.network(), Some("NL"));
    }

    #[test]
    fn test_blank_values_count_as_absent_but_keys_survive() {
        let query = UserQuery::from_pairs([("key", "")]);
        assert_eq!(query.get("key"), None);
        assert_eq!(query.keys().collect::<Vec<_>>(), vec!["key"]);
    }

    #[test]
    fn test_catalog_wide_detection() {
        assert!(UserQuery::default().is_catalog_wide());
        assert!(UserQuery::from_pairs([("net", "*"), ("sta", "*")]).is_catalog_wide());
        assert!(UserQuery::from_pairs([("cha", "BHZ")]).is_catalog_wide());
        assert!(!UserQuery::from_pairs([("net", "NL")]).is_catalog_wide());
        assert!(!UserQuery::from_pairs([("sta", "HGN")]).is_catalog_wide());
    }

    #[test]
    fn test_post_body_splits_params_and_selectors() {
        let body = "quality=D\n\n\
                    NL HGN * BHZ 2000-01-01 2000-01-02\n\
                    GE WLF -- HHZ 2000-01-01 2000-01-03\n";
        let query = UserQuery::from_post_body(body);
        assert_eq!(query.get("quality"), Some("D"));
        assert_eq!(query.selectors().len(), 2);
        assert!(!query.is_catalog_wide());

        let selector = Selector::parse(&query.selectors()[1]).unwrap();
        assert_eq!(selector.network, "GE");
        assert_eq!(selector.location, "--");
        assert_eq!(selector.start, "2000-01-01");
        assert_eq!(selector.to_line(), "GE WLF -- HHZ 2000-01-01 2000-01-03");
    }

    #[test]
    fn test_selector_needs_six_fields() {
        let err = Selector::parse("NL HGN * BHZ 2000-01-01").unwrap_err();
        assert_eq!(err.to_string(), "Invalid segment submitted.");
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!(Level::parse("channel"), Some(Level::Channel));
        assert_eq!(Level::parse("response"), None);
        assert_eq!(Format::parse("text"), Some(Format::Text));
        assert_eq!(Format::parse("json"), None);
        assert_eq!(Quality::parse("M"), Some(Quality::Modified));
        assert_eq!(Quality::parse("d"), None);
    }
}
