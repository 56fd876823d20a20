//! Backend leg worker
//!
//! A [`Worker`] executes one [`BackendRequest`] at a time:
//!
//! ```text
//! Idle → Requesting → {Succeeded | Failed} → [Retrying → Requesting]* → Closed
//! ```
//!
//! The per-leg timer covers the whole exchange, headers and body. Only a
//! failed exchange or a status ≥500 is retried, and only while retry budget
//! remains. Cancelling the session token drops the in-flight request future,
//! which aborts the transport, and closes the worker immediately.

use crate::config::FederationConfig;
use bytes::Bytes;
use eidafed_common::BackendRequest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Identifying client header sent on every outbound leg
pub const USER_AGENT: &str = concat!("EIDA-Federator/", env!("CARGO_PKG_VERSION"));

/// Status recorded when the per-leg timer fires
pub const STATUS_TIMEOUT: u16 = 504;
/// Status recorded for connection or body read failures
pub const STATUS_TRANSPORT_FAILURE: u16 = 502;
/// Status recorded for a leg aborted by session cancellation
pub const STATUS_CANCELLED: u16 = 499;

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Requesting,
    Succeeded,
    Failed,
    Retrying,
    Closed,
}

/// Timeout and retry policy for one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl From<&FederationConfig> for LegPolicy {
    fn from(config: &FederationConfig) -> Self {
        Self {
            timeout: config.leg_timeout,
            retries: config.leg_retries,
            backoff: config.retry_backoff,
        }
    }
}

/// Everything a worker borrows from its session
#[derive(Debug, Clone)]
pub struct LegContext {
    pub http_client: reqwest::Client,
    pub policy: LegPolicy,
    pub cancel: CancellationToken,
}

/// Final report of one leg
#[derive(Debug, Clone)]
pub struct LegOutcome {
    pub request: BackendRequest,
    pub status: u16,
    pub body: Bytes,
    pub attempts: u32,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl LegOutcome {
    /// A 2xx with something to merge
    pub fn has_payload(&self) -> bool {
        !self.cancelled && (200..300).contains(&self.status) && !self.body.is_empty()
    }
}

enum Attempt {
    /// A complete response, any status
    Response { status: u16, body: Bytes },
    /// Timed out or failed before a complete response
    Failed { status: u16 },
}

/// One pool slot of a session
#[derive(Debug)]
pub struct Worker {
    index: usize,
    group: usize,
    state: WorkerState,
    retries_left: u32,
}

impl Worker {
    pub fn new(index: usize, group: usize) -> Self {
        Self {
            index,
            group,
            state: WorkerState::Idle,
            retries_left: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Queue this worker currently drains
    pub fn group(&self) -> usize {
        self.group
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Point a closed worker at another queue and make it reusable
    pub fn reassign(&mut self, group: usize) {
        self.group = group;
        self.state = WorkerState::Idle;
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::trace!(worker = self.index, from = ?self.state, to = ?next, "Worker transition");
        self.state = next;
    }

    /// Drive one request to `Closed`.
    ///
    /// Ownership moves in and back out so a session can hand the worker its
    /// next request without sharing it.
    pub async fn run(
        mut self,
        request: BackendRequest,
        ctx: Arc<LegContext>,
    ) -> (Worker, LegOutcome) {
        let opened = Instant::now();
        self.retries_left = ctx.policy.retries;

        let mut attempts = 0;
        let mut last: Option<(u16, Bytes)> = None;

        let cancelled = loop {
            self.transition(WorkerState::Requesting);
            attempts += 1;

            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                result = exchange_once(&ctx, &request) => Some(result),
            };

            let retryable = match result {
                None => break true,
                Some(Attempt::Response { status, body }) => {
                    self.transition(WorkerState::Succeeded);
                    last = Some((status, body));
                    status >= 500
                }
                Some(Attempt::Failed { status }) => {
                    self.transition(WorkerState::Failed);
                    last = Some((status, Bytes::new()));
                    true
                }
            };

            if !retryable || self.retries_left == 0 {
                break false;
            }

            self.retries_left -= 1;
            self.transition(WorkerState::Retrying);
            tracing::debug!(
                worker = self.index,
                host = request.host(),
                status = ?last.as_ref().map(|(s, _)| *s),
                "Retrying leg after {:?}",
                ctx.policy.backoff
            );

            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break true,
                _ = tokio::time::sleep(ctx.policy.backoff) => {}
            }
        };

        self.transition(WorkerState::Closed);

        let (status, body) = match last {
            Some(last) if !cancelled => last,
            _ => (STATUS_CANCELLED, Bytes::new()),
        };
        let outcome = LegOutcome {
            request,
            status,
            body,
            attempts,
            elapsed: opened.elapsed(),
            cancelled,
        };
        (self, outcome)
    }
}

async fn exchange_once(ctx: &LegContext, request: &BackendRequest) -> Attempt {
    let exchange = async {
        let response = ctx
            .http_client
            .get(request.url().clone())
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, body))
    };

    match tokio::time::timeout(ctx.policy.timeout, exchange).await {
        Ok(Ok((status, body))) => Attempt::Response { status, body },
        Ok(Err(e)) => {
            tracing::debug!(host = request.host(), "Leg transport failure: {}", e);
            Attempt::Failed {
                status: STATUS_TRANSPORT_FAILURE,
            }
        }
        Err(_) => {
            tracing::debug!(host = request.host(), "Leg timed out after {:?}", ctx.policy.timeout);
            Attempt::Failed {
                status: STATUS_TIMEOUT,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BackendRequest {
        BackendRequest::new("http://127.0.0.1:9/fdsnws/station/1/query", [("network", "NL")])
            .unwrap()
    }

    #[test]
    fn test_user_agent_identifies_federator() {
        assert!(USER_AGENT.starts_with("EIDA-Federator/"));
    }

    #[test]
    fn test_payload_requires_2xx_and_bytes() {
        let outcome = |status, body: &'static [u8]| LegOutcome {
            request: request(),
            status,
            body: Bytes::from_static(body),
            attempts: 1,
            elapsed: Duration::ZERO,
            cancelled: false,
        };
        assert!(outcome(200, b"x").has_payload());
        assert!(!outcome(200, b"").has_payload());
        assert!(!outcome(204, b"").has_payload());
        assert!(!outcome(404, b"x").has_payload());
        assert!(!outcome(500, b"x").has_payload());
    }

    #[tokio::test]
    async fn test_cancelled_token_closes_without_payload() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = Arc::new(LegContext {
            http_client: reqwest::Client::new(),
            policy: LegPolicy {
                timeout: Duration::from_secs(5),
                retries: 1,
                backoff: Duration::from_millis(10),
            },
            cancel,
        });

        let (worker, outcome) = Worker::new(0, 0).run(request(), ctx).await;
        assert_eq!(worker.state(), WorkerState::Closed);
        assert!(outcome.cancelled);
        assert_eq!(outcome.status, STATUS_CANCELLED);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_reassign_resets_to_idle() {
        let mut worker = Worker::new(3, 0);
        worker.transition(WorkerState::Closed);
        worker.reassign(2);
        assert_eq!(worker.group(), 2);
        assert_eq!(worker.index(), 3);
        assert_eq!(worker.state(), WorkerState::Idle);
    }
}
