//! # eidafed Common Library
//!
//! Shared query/URL model for the federator:
//! - Stream patterns and routing entries returned by the discovery service
//! - Normalized client query parameters
//! - Backend request construction
//! - FDSN time parsing and formatting
//! - Bootstrap configuration file loading

pub mod config;
pub mod error;
pub mod query;
pub mod request;
pub mod stream;
pub mod time;

pub use error::{Error, Result};
pub use query::UserQuery;
pub use request::BackendRequest;
pub use stream::{BundledRoute, RouteEntry, StreamPattern, WILDCARD};
pub use time::TimeWindow;
