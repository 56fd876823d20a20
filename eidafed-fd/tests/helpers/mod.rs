//! Shared fixtures for eidafed-fd integration tests
//!
//! Mock routing and backend services are plain axum routers served on an
//! ephemeral local port.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use eidafed_fd::config::FederationConfig;
use eidafed_fd::federation::{MemoryLog, RequestRecord};
use eidafed_fd::AppState;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

/// Serve `router` on 127.0.0.1 and return its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Should bind test listener");
    let addr = listener.local_addr().expect("Should have local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock server failed");
    });
    format!("http://{}", addr)
}

/// Federation settings tuned for fast tests
pub fn test_config() -> FederationConfig {
    FederationConfig {
        workers: 4,
        leg_timeout: Duration::from_secs(2),
        leg_retries: 0,
        retry_backoff: Duration::from_millis(10),
        max_window: chrono::Duration::days(7),
        bundle_by_year: false,
    }
}

/// Federator app pointed at a routing service, with an in-memory log
pub fn setup_app(routing_url: &str, config: FederationConfig) -> (Router, Arc<MemoryLog>) {
    let log = Arc::new(MemoryLog::new());
    let http_client = eidafed_fd::build_http_client().expect("Should build HTTP client");
    let state = AppState::new(config, http_client, routing_url, log.clone());
    (eidafed_fd::build_router(state), log)
}

/// Routing service answering every query with `routes`
pub async fn routing_service(routes: serde_json::Value) -> String {
    let router = Router::new().route(
        "/eidaws/routing/1/query",
        axum::routing::get(move || {
            let routes = routes.clone();
            async move { axum::Json(routes) }
        }),
    );
    format!("{}/eidaws/routing/1/query", serve(router).await)
}

/// Routing service answering with a fixed status and no body
pub async fn routing_status(status: StatusCode) -> String {
    let router = Router::new().route(
        "/eidaws/routing/1/query",
        axum::routing::get(move || async move { status }),
    );
    format!("{}/eidaws/routing/1/query", serve(router).await)
}

/// One route entry: backend URL plus `(net, sta)` patterns
pub fn route(url: &str, patterns: &[(&str, &str)]) -> serde_json::Value {
    json!({
        "url": url,
        "params": patterns
            .iter()
            .map(|(net, sta)| json!({
                "net": net,
                "sta": sta,
                "loc": "*",
                "cha": "*",
                "start": "1990-01-01T00:00:00",
                "end": ""
            }))
            .collect::<Vec<_>>()
    })
}

/// Minimal FDSNStationXML document with one network per code
pub fn station_xml(networks: &[&str]) -> String {
    let inner: String = networks
        .iter()
        .map(|code| format!("<Network code=\"{}\"><Station code=\"X\"/></Network>", code))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<FDSNStationXML xmlns=\"http://www.fdsn.org/xml/station/1\" schemaVersion=\"1.0\"><Source>Node</Source><Created>2020-01-01T00:00:00</Created>{}</FDSNStationXML>",
        inner
    )
}

/// miniSEED record of `2^exponent` bytes filled with `fill`
pub fn mseed_record(station: &str, exponent: u8, fill: u8) -> Vec<u8> {
    let len = 1usize << exponent;
    let mut data = vec![fill; len];
    data[..6].copy_from_slice(b"000001");
    data[6] = b'D';
    data[7] = b' ';
    data[8..13].copy_from_slice(format!("{:<5}", station).as_bytes());
    data[13..15].copy_from_slice(b"  ");
    data[15..18].copy_from_slice(b"BHZ");
    data[18..20].copy_from_slice(b"NL");
    data[20..22].copy_from_slice(&2010u16.to_be_bytes());
    data[22..24].copy_from_slice(&100u16.to_be_bytes());
    data[39] = 1;
    data[44..46].copy_from_slice(&64u16.to_be_bytes());
    data[46..48].copy_from_slice(&48u16.to_be_bytes());
    data[48..50].copy_from_slice(&1000u16.to_be_bytes());
    data[50..52].copy_from_slice(&0u16.to_be_bytes());
    data[52] = 10;
    data[53] = 1;
    data[54] = exponent;
    data[55] = 0;
    data
}

/// Send a GET through the router and collect the whole response
pub async fn get(app: Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(app, Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()).await
}

/// Send a POST with a plain-text body through the router
pub async fn post(app: Router, uri: &str, body: &str) -> (StatusCode, HeaderMap, Bytes) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    (status, headers, body)
}

/// Wait until the request record of the finished federation job is logged
pub async fn wait_for_request(log: &MemoryLog) -> RequestRecord {
    for _ in 0..200 {
        if let Some(record) = log.requests().into_iter().next() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("No request record logged");
}
