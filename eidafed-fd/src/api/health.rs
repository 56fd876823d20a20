//! Health check endpoint
//!
//! Reports the build the service runs and the federation limits it was
//! started with, so an operator can tell instances apart behind a proxy.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Compile-time build identification
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub git_hash: &'static str,
    pub timestamp: &'static str,
    pub profile: &'static str,
}

pub const BUILD: BuildInfo = BuildInfo {
    git_hash: env!("GIT_HASH"),
    timestamp: env!("BUILD_TIMESTAMP"),
    profile: env!("BUILD_PROFILE"),
};

#[derive(Debug, Serialize)]
pub struct FederationLimits {
    pub workers: usize,
    pub leg_timeout_ms: u64,
    pub leg_retries: u32,
    pub max_window_days: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub build: BuildInfo,
    pub federation: FederationLimits,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        status: "ok",
        module: "eidafed-fd",
        version: env!("CARGO_PKG_VERSION"),
        build: BUILD,
        federation: FederationLimits {
            workers: config.workers,
            leg_timeout_ms: config.leg_timeout.as_millis() as u64,
            leg_retries: config.leg_retries,
            max_window_days: config.max_window.num_days(),
        },
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
