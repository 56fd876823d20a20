//! Federated station (catalog) queries
//!
//! GET/POST /fdsnws/station/1/query

use super::{no_content, peer_addr, reject, stream_response, user_query, RequestInfo};
use crate::assembler::{stream_session, TextMerger, XmlMerger};
use crate::federation::{bundle_routes, BundleOptions, Session};
use crate::validation::{validate_station, STATION_PARAMETERS};
use crate::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use eidafed_common::query::{Format, Level};
use eidafed_common::{BackendRequest, BundledRoute, UserQuery};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// GET/POST /fdsnws/station/1/query
pub async fn query(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: String,
) -> Response {
    let info = RequestInfo::new(&method, &uri, &headers, peer_addr(connect));
    let mut query = user_query(&method, &uri, &body);

    if let Err(e) = validate_station(&method, &query) {
        tracing::info!(request_id = %info.id, "Rejected station request: {}", e);
        return reject(&state, &info, e.into());
    }

    let options = BundleOptions {
        across_networks: matches!(query.level(), None | Some(Level::Network | Level::Station)),
        split_by_year: state.config.bundle_by_year,
        keep_windows: method == Method::POST,
    };

    if query.format().is_none() {
        query.set("format", Format::Xml.as_str());
    }
    if query.level().is_none() {
        query.set("level", Level::Station.as_str());
    }

    let routes = match state.discovery.routes(&query).await {
        Ok(routes) => routes,
        Err(e) => return reject(&state, &info, e.into()),
    };

    let bundled = bundle_routes(&routes, options, query.is_catalog_wide());
    let groups = station_requests(&bundled, &query);

    let cancel = CancellationToken::new();
    let ctx = state.session_context(info.id, cancel.clone());
    let Some(session) = Session::start(groups, &ctx) else {
        return no_content(&state, &info, 0);
    };

    let level = query.level().unwrap_or(Level::Station);
    let format = query.format().unwrap_or(Format::Xml);

    stream_response(&state, info, cancel, move |mut writer| async move {
        let summary = match format {
            Format::Xml => stream_session(session, XmlMerger, &mut writer).await,
            Format::Text => stream_session(session, TextMerger::new(level), &mut writer).await,
        };
        (writer, summary.legs)
    })
    .await
}

/// One group of backend requests per bundled route
pub fn station_requests(routes: &[BundledRoute], query: &UserQuery) -> Vec<Vec<BackendRequest>> {
    routes
        .iter()
        .map(|route| {
            route
                .patterns
                .iter()
                .filter_map(|pattern| {
                    let mut params: Vec<(&str, &str)> = vec![
                        ("network", pattern.network.as_str()),
                        ("station", pattern.station.as_str()),
                        ("location", pattern.location.as_str()),
                        ("channel", pattern.channel.as_str()),
                    ];
                    if let Some(start) = non_blank(&pattern.start).or(query.starttime()) {
                        params.push(("starttime", start));
                    }
                    if let Some(end) = non_blank(&pattern.end).or(query.endtime()) {
                        params.push(("endtime", end));
                    }
                    params.extend(
                        STATION_PARAMETERS
                            .iter()
                            .filter_map(|key| query.get(key).map(|value| (*key, value))),
                    );

                    BackendRequest::new(&route.url, params)
                        .map_err(|e| {
                            tracing::warn!(backend = %route.url, "Skipping station leg: {}", e)
                        })
                        .ok()
                })
                .collect()
        })
        .collect()
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eidafed_common::StreamPattern;

    #[test]
    fn test_station_requests_forward_catalog_parameters() {
        let query = UserQuery::from_pairs([
            ("net", "NL"),
            ("start", "2010-01-01"),
            ("minlatitude", "50"),
            ("level", "channel"),
            ("format", "text"),
        ]);
        let routes = vec![BundledRoute {
            url: "http://node.example.org/fdsnws/station/1/query".into(),
            patterns: vec![StreamPattern::new("NL", "HGN,DBN", "*", "BH?")],
        }];

        let groups = station_requests(&routes, &query);
        assert_eq!(groups.len(), 1);
        let request = &groups[0][0];
        assert_eq!(request.param("station").as_deref(), Some("HGN,DBN"));
        assert_eq!(request.param("channel").as_deref(), Some("BH?"));
        assert_eq!(request.param("starttime").as_deref(), Some("2010-01-01"));
        assert_eq!(request.param("endtime"), None);
        assert_eq!(request.param("minlatitude").as_deref(), Some("50"));
        assert_eq!(request.param("level").as_deref(), Some("channel"));
        assert_eq!(request.param("format").as_deref(), Some("text"));
    }

    #[test]
    fn test_pattern_window_wins_over_query() {
        let query = UserQuery::from_pairs([("starttime", "2010-01-01"), ("endtime", "2011-01-01")]);
        let routes = vec![BundledRoute {
            url: "http://node.example.org/fdsnws/station/1/query".into(),
            patterns: vec![StreamPattern::new("NL", "HGN", "*", "*")
                .with_epoch(Some("2012-01-01T00:00:00"), Some("2012-02-01T00:00:00"))],
        }];

        let request = &station_requests(&routes, &query)[0][0];
        assert_eq!(request.param("starttime").as_deref(), Some("2012-01-01T00:00:00"));
        assert_eq!(request.param("endtime").as_deref(), Some("2012-02-01T00:00:00"));
    }
}
