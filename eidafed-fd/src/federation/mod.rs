//! Federation engine
//!
//! Route bundling, time-window segmentation, and the session/worker pool
//! that fans backend legs out and reports their results as ordered events.

pub mod bundler;
pub mod log;
pub mod session;
pub mod splitter;
pub mod worker;

pub use bundler::{bundle_routes, BundleOptions};
pub use log::{FederationLog, JsonLinesLog, LegRecord, MemoryLog, RequestRecord, TracingLog};
pub use session::{LegPayload, Session, SessionContext, SessionEvent, SessionHandle, SessionSummary};
pub use splitter::split_window;
pub use worker::{LegPolicy, Worker, WorkerState, USER_AGENT};
