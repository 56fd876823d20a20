//! Routing (discovery) service client
//!
//! Asks the routing service which data centers hold streams matching the
//! client's filters. GET requests carry the filters as query parameters; POST
//! requests forward the client's selector lines in the body. Either way the
//! fixed `service=station&format=json` is requested.

use crate::error::DiscoveryError;
use eidafed_common::query::Selector;
use eidafed_common::{RouteEntry, UserQuery};
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

/// Filters forwarded from the client query
const FORWARDED_FILTERS: [&str; 6] = [
    "network",
    "station",
    "location",
    "channel",
    "starttime",
    "endtime",
];

/// Routing service client
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http_client: reqwest::Client,
    routing_url: String,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(
        http_client: reqwest::Client,
        routing_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            routing_url: routing_url.into(),
            timeout,
        }
    }

    /// Look up the backends matching a client query.
    ///
    /// A 204 answer means no backend matches and yields an empty list.
    pub async fn routes(&self, query: &UserQuery) -> Result<Vec<RouteEntry>, DiscoveryError> {
        let request = if query.selectors().is_empty() {
            let url = self.get_url(query)?;
            tracing::debug!(url = %url, "Querying routing service");
            self.http_client.get(url)
        } else {
            tracing::debug!(
                url = %self.routing_url,
                selectors = query.selectors().len(),
                "Posting selectors to routing service"
            );
            self.http_client
                .post(&self.routing_url)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(post_body(query))
        };

        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            tracing::info!("Routing service returned no routes");
            return Ok(Vec::new());
        }

        if status != StatusCode::OK {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let routes: Vec<RouteEntry> = serde_json::from_slice(&body)?;

        tracing::info!(
            backends = routes.len(),
            patterns = routes.iter().map(|r| r.params.len()).sum::<usize>(),
            "Retrieved routes"
        );

        Ok(routes)
    }

    fn get_url(&self, query: &UserQuery) -> Result<Url, DiscoveryError> {
        let mut params = vec![("service", "station"), ("format", "json")];
        params.extend(
            FORWARDED_FILTERS
                .iter()
                .filter_map(|key| query.get(key).map(|value| (*key, value))),
        );
        Ok(Url::parse_with_params(&self.routing_url, params)?)
    }
}

/// POST body: fixed parameters followed by the client's selector lines,
/// re-joined with single spaces. Malformed lines were rejected by validation.
fn post_body(query: &UserQuery) -> String {
    let mut body = String::from("service=station\nformat=json\n");
    for line in query.selectors() {
        match Selector::parse(line) {
            Ok(selector) => {
                body.push_str(&selector.to_line());
                body.push('\n');
            }
            Err(e) => tracing::warn!(line = %line, "Dropping selector: {}", e),
        }
    }
    body
}
