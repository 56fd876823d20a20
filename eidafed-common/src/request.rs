//! Resolved backend requests
//!
//! A [`BackendRequest`] is one fully-built URL aimed at one data center. It is
//! immutable once constructed; workers only ever read it.

use crate::time::TimeWindow;
use crate::Result;
use url::Url;

/// One outbound leg target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    url: Url,
    window: Option<TimeWindow>,
}

impl BackendRequest {
    /// Resolve `base` with the given query parameters appended in order
    pub fn new<I, K, V>(base: &str, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = Url::parse_with_params(base, params)?;
        Ok(Self {
            url,
            window: None,
        })
    }

    /// Record the time window this request covers
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> &str {
        self.url.query().unwrap_or_default()
    }

    pub fn window(&self) -> Option<&TimeWindow> {
        self.window.as_ref()
    }

    /// Value of one query parameter, if present
    pub fn param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

impl std::fmt::Display for BackendRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}
