//! HTTP API handlers for eidafed-fd

pub mod dataselect;
pub mod health;
pub mod station;

pub use health::health_routes;

use crate::assembler::output::{self, ResponseWriter};
use crate::error::ApiError;
use crate::federation::RequestRecord;
use crate::AppState;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use eidafed_common::UserQuery;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Who asked for what, captured once per client request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub query: String,
    pub client: String,
    pub user_agent: Option<String>,
    started: Instant,
}

impl RequestInfo {
    pub fn new(method: &Method, uri: &Uri, headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            id: Uuid::new_v4(),
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or_default().to_string(),
            client: forwarded
                .or_else(|| peer.map(|addr| addr.ip().to_string()))
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            started: Instant::now(),
        }
    }

    pub fn record(&self, status: u16, bytes: usize, legs: usize) -> RequestRecord {
        RequestRecord {
            request_id: self.id,
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            client: self.client.clone(),
            status,
            bytes,
            legs,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            user_agent: self.user_agent.clone(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Peer address when the server was started with connect info
pub(crate) fn peer_addr(connect: Option<ConnectInfo<SocketAddr>>) -> Option<SocketAddr> {
    connect.map(|ConnectInfo(addr)| addr)
}

/// Normalized client parameters: query string for GET, body for POST
pub(crate) fn user_query(method: &Method, uri: &Uri, body: &str) -> UserQuery {
    if *method == Method::POST {
        UserQuery::from_post_body(body)
    } else {
        UserQuery::from_pairs(url::form_urlencoded::parse(
            uri.query().unwrap_or_default().as_bytes(),
        ))
    }
}

/// Answer with an error and log the request
pub(crate) fn reject(state: &AppState, info: &RequestInfo, err: ApiError) -> Response {
    let response = err.into_response();
    state
        .log
        .request(&info.record(response.status().as_u16(), 0, 0));
    response
}

/// Answer with no content and log the request
pub(crate) fn no_content(state: &AppState, info: &RequestInfo, legs: usize) -> Response {
    state.log.request(&info.record(204, 0, legs));
    StatusCode::NO_CONTENT.into_response()
}

/// Run a federation job in its own task and stream what it writes.
///
/// The job gets the writer, decides the head, and hands the writer back with
/// the number of legs it issued. The request record is logged once the job
/// is done, with 499 if the client went away first.
pub(crate) async fn stream_response<F, Fut>(
    state: &AppState,
    info: RequestInfo,
    cancel: CancellationToken,
    job: F,
) -> Response
where
    F: FnOnce(ResponseWriter) -> Fut + Send + 'static,
    Fut: Future<Output = (ResponseWriter, usize)> + Send + 'static,
{
    let (writer, pending) = output::channel(cancel);
    let log = state.log.clone();

    tokio::spawn(async move {
        let (writer, legs) = job(writer).await;
        let record = info.record(writer.final_status(), writer.bytes_written(), legs);
        tracing::debug!(
            request_id = %info.id,
            status = record.status,
            bytes = record.bytes,
            legs,
            "Federated request finished"
        );
        log.request(&record);
    });

    pending.into_response().await
}
