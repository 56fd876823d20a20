//! eidafed-fd library - federated FDSN web services
//!
//! One client query is routed to every data center holding matching streams;
//! the backend responses are merged into a single streamed response.

use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod api;
pub mod assembler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod federation;
pub mod validation;

use config::FederationConfig;
use discovery::DiscoveryClient;
use federation::{FederationLog, LegPolicy, SessionContext, USER_AGENT};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Fan-out and merge tuning
    pub config: Arc<FederationConfig>,
    /// Pooled client for every backend leg
    pub http_client: reqwest::Client,
    pub discovery: DiscoveryClient,
    /// Operational log sink
    pub log: Arc<dyn FederationLog>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: FederationConfig,
        http_client: reqwest::Client,
        routing_url: impl Into<String>,
        log: Arc<dyn FederationLog>,
    ) -> Self {
        let discovery = DiscoveryClient::new(http_client.clone(), routing_url, config.leg_timeout);
        Self {
            config: Arc::new(config),
            http_client,
            discovery,
            log,
        }
    }

    /// Session inputs for one client request
    pub fn session_context(&self, request_id: Uuid, cancel: CancellationToken) -> SessionContext {
        SessionContext {
            http_client: self.http_client.clone(),
            policy: LegPolicy::from(self.config.as_ref()),
            workers: self.config.workers,
            log: Arc::clone(&self.log),
            request_id,
            cancel,
        }
    }
}

/// Outbound HTTP client carrying the federator's identifying header
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;
    use tower_http::trace::TraceLayer;

    let fdsnws = Router::new()
        .route(
            "/fdsnws/station/1/query",
            get(api::station::query).post(api::station::query),
        )
        .route(
            "/fdsnws/dataselect/1/query",
            get(api::dataselect::query).post(api::dataselect::query),
        );

    Router::new()
        .merge(fdsnws)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
