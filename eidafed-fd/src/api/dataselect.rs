//! Federated time-series queries
//!
//! GET/POST /fdsnws/dataselect/1/query
//!
//! Runs in two phases: a channel listing from every matched station backend,
//! then one dataselect leg per resolved channel and time segment, merged into
//! a single miniSEED stream.

use super::station::non_blank;
use super::{no_content, peer_addr, reject, stream_response, user_query, RequestInfo};
use crate::assembler::expansion::collect_channels;
use crate::assembler::{stream_session, BinaryMerger};
use crate::federation::{bundle_routes, BundleOptions, Session};
use crate::validation::validate_dataselect;
use crate::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use eidafed_common::query::{Format, Level};
use eidafed_common::{BackendRequest, BundledRoute, UserQuery};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// GET/POST /fdsnws/dataselect/1/query
pub async fn query(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: String,
) -> Response {
    let info = RequestInfo::new(&method, &uri, &headers, peer_addr(connect));
    let query = user_query(&method, &uri, &body);

    if let Err(e) = validate_dataselect(&method, &query) {
        tracing::info!(request_id = %info.id, "Rejected dataselect request: {}", e);
        return reject(&state, &info, e.into());
    }

    let routes = match state.discovery.routes(&query).await {
        Ok(routes) => routes,
        Err(e) => return reject(&state, &info, e.into()),
    };

    let options = listing_options(&query, state.config.bundle_by_year, method == Method::POST);
    let bundled = bundle_routes(&routes, options, query.is_catalog_wide());
    let groups = channel_requests(&bundled, &query);

    let cancel = CancellationToken::new();
    let ctx = state.session_context(info.id, cancel.clone());
    let Some(listing) = Session::start(groups, &ctx) else {
        return no_content(&state, &info, 0);
    };

    let max_window = state.config.max_window;
    let quality = query.get("quality").map(str::to_string);

    stream_response(&state, info, cancel, move |mut writer| async move {
        let (collector, expansion) = collect_channels(listing).await;
        let Some(collector) = collector else {
            writer.no_content();
            return (writer, expansion.legs);
        };

        let requests = collector.into_requests(max_window, quality.as_deref());
        let legs = expansion.legs;
        match Session::start(requests, &ctx) {
            Some(session) => {
                let summary = stream_session(session, BinaryMerger::new(), &mut writer).await;
                (writer, legs + summary.legs)
            }
            None => {
                tracing::info!("No channels resolved, nothing to fetch");
                writer.no_content();
                (writer, legs)
            }
        }
    })
    .await
}

/// Bundling for the channel listing phase.
///
/// Dataselect queries carry no detail level, so wildcard-station patterns
/// merge across networks.
pub fn listing_options(query: &UserQuery, split_by_year: bool, post: bool) -> BundleOptions {
    BundleOptions {
        across_networks: query.level().is_none(),
        split_by_year,
        keep_windows: post,
    }
}

/// Channel listing requests, one group per bundled route.
///
/// Patterns without a time window of their own fall back to the query's;
/// patterns with neither are skipped.
pub fn channel_requests(
    routes: &[BundledRoute],
    query: &UserQuery,
) -> Vec<Vec<BackendRequest>> {
    routes
        .iter()
        .map(|route| {
            route
                .patterns
                .iter()
                .filter_map(|pattern| {
                    let window = pattern.window().or_else(|| query.window());
                    let (Some(start), Some(end), Some(window)) = (
                        non_blank(&pattern.start).or(query.starttime()),
                        non_blank(&pattern.end).or(query.endtime()),
                        window,
                    ) else {
                        tracing::warn!(
                            backend = %route.url,
                            network = %pattern.network,
                            "Pattern without time window skipped"
                        );
                        return None;
                    };

                    let params = [
                        ("network", pattern.network.as_str()),
                        ("station", pattern.station.as_str()),
                        ("location", pattern.location.as_str()),
                        ("channel", pattern.channel.as_str()),
                        ("starttime", start),
                        ("endtime", end),
                        ("level", Level::Channel.as_str()),
                        ("format", Format::Text.as_str()),
                    ];
                    BackendRequest::new(&route.url, params)
                        .map(|request| request.with_window(window))
                        .map_err(|e| {
                            tracing::warn!(backend = %route.url, "Skipping channel listing: {}", e)
                        })
                        .ok()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eidafed_common::{RouteEntry, StreamPattern, TimeWindow};

    fn route(patterns: Vec<StreamPattern>) -> Vec<BundledRoute> {
        vec![BundledRoute {
            url: "http://node.example.org/fdsnws/station/1/query".into(),
            patterns,
        }]
    }

    #[test]
    fn test_channel_requests_ask_for_text_channels() {
        let query =
            UserQuery::from_pairs([("net", "NL"), ("start", "2010-01-01"), ("end", "2010-01-03")]);
        let groups =
            channel_requests(&route(vec![StreamPattern::new("NL", "*", "*", "*")]), &query);

        let request = &groups[0][0];
        assert_eq!(request.param("level").as_deref(), Some("channel"));
        assert_eq!(request.param("format").as_deref(), Some("text"));
        assert_eq!(request.param("starttime").as_deref(), Some("2010-01-01"));
        assert_eq!(
            request.window().copied(),
            Some(TimeWindow::parse("2010-01-01", "2010-01-03").unwrap())
        );
    }

    #[test]
    fn test_patterns_without_window_are_skipped() {
        let query = UserQuery::from_pairs([("net", "NL")]);
        let groups =
            channel_requests(&route(vec![StreamPattern::new("NL", "*", "*", "*")]), &query);
        assert!(groups[0].is_empty());
    }

    #[test]
    fn test_wildcard_station_networks_share_one_listing() {
        let query =
            UserQuery::from_pairs([("net", "N*"), ("start", "2010-01-01"), ("end", "2010-01-03")]);
        let routes = vec![RouteEntry {
            url: "http://node.example.org/fdsnws/station/1/query".into(),
            params: vec![
                StreamPattern::new("NL", "*", "*", "*"),
                StreamPattern::new("NR", "*", "*", "*"),
            ],
        }];

        let options = listing_options(&query, false, false);
        assert!(options.across_networks);

        let bundled = bundle_routes(&routes, options, query.is_catalog_wide());
        let groups = channel_requests(&bundled, &query);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0][0].param("network").as_deref(), Some("NL,NR"));
        assert_eq!(groups[0][0].param("station").as_deref(), Some("*"));
    }
}
