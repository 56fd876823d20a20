//! Error types for eidafed-fd
//!
//! Only two conditions ever reach the client as errors: rejected parameters
//! (400) and a failed discovery call (502). Backend leg failures are recovered
//! inside the federation session and never surface here.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Routing (discovery) service failure
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Connection, timeout or body read failure
    #[error("Routing request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Any status other than 200 or 204
    #[error("Routing service returned status {0}")]
    Status(u16),

    /// Body was not the expected JSON route list
    #[error("Routing response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// Request URL could not be built
    #[error("Invalid routing URL: {0}")]
    Url(#[from] url::ParseError),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400); message shown verbatim
    #[error("{0}")]
    BadRequest(String),

    /// Routing lookup failed (502)
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<eidafed_common::Error> for ApiError {
    fn from(err: eidafed_common::Error) -> Self {
        match err {
            eidafed_common::Error::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Discovery(err) => {
                tracing::error!("Discovery failed: {}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    "Could not get routing information.".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}
