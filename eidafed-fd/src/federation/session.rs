//! Federation session
//!
//! A session owns a fixed pool of [`Worker`]s and one queue of pending
//! [`BackendRequest`]s per group (one group per backend). It keeps at most
//! `workers` legs in flight; a worker that closes immediately takes the next
//! request from its own queue, or from the fullest other queue once its own
//! is drained.
//!
//! Events reach the consumer in this order:
//! - [`SessionEvent::Header`] once, before the first payload
//! - [`SessionEvent::Data`] per leg closing with a 2xx and a non-empty body,
//!   in completion order
//! - [`SessionEvent::End`] once, when every worker is closed and every queue
//!   is empty
//!
//! Legs closing with any other status are logged and left out. Killing the
//! session aborts every in-flight leg, drops the queues and suppresses any
//! further event.

use super::log::{FederationLog, LegRecord};
use super::worker::{LegContext, LegOutcome, LegPolicy, Worker};
use bytes::Bytes;
use eidafed_common::BackendRequest;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Buffered events between the session loop and its consumer
const EVENT_BUFFER: usize = 16;

/// One merged-ready backend response
#[derive(Debug, Clone)]
pub struct LegPayload {
    pub request: BackendRequest,
    pub status: u16,
    pub body: Bytes,
}

/// Lifecycle events of a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Header,
    Data(LegPayload),
    End,
}

/// What a finished session did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: Uuid,
    /// Legs handed to workers
    pub legs: usize,
    /// Payload bytes delivered through `Data` events
    pub bytes: usize,
    pub killed: bool,
}

/// Shared inputs of every session started for one client request
#[derive(Clone)]
pub struct SessionContext {
    pub http_client: reqwest::Client,
    pub policy: LegPolicy,
    pub workers: usize,
    pub log: Arc<dyn FederationLog>,
    /// Client request this session serves
    pub request_id: Uuid,
    /// Cancelled when the client goes away; sessions hang a child token off it
    pub cancel: CancellationToken,
}

/// Entry point for starting sessions
pub struct Session;

impl Session {
    /// Start driving `groups` of requests.
    ///
    /// Returns `None` when there is nothing to request; callers answer with
    /// no content instead.
    pub fn start(groups: Vec<Vec<BackendRequest>>, ctx: &SessionContext) -> Option<SessionHandle> {
        let queues: Vec<VecDeque<BackendRequest>> = groups
            .into_iter()
            .filter(|g| !g.is_empty())
            .map(VecDeque::from)
            .collect();

        let total: usize = queues.iter().map(VecDeque::len).sum();
        if total == 0 {
            return None;
        }

        let id = Uuid::new_v4();
        let cancel = ctx.cancel.child_token();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let pool_size = ctx.workers.max(1).min(total);

        tracing::debug!(
            session_id = %id,
            request_id = %ctx.request_id,
            groups = queues.len(),
            requests = total,
            workers = pool_size,
            "Starting federation session"
        );

        let driver = SessionDriver {
            id,
            request_id: ctx.request_id,
            queues,
            tasks: JoinSet::new(),
            leg_ctx: Arc::new(LegContext {
                http_client: ctx.http_client.clone(),
                policy: ctx.policy,
                cancel: cancel.clone(),
            }),
            log: Arc::clone(&ctx.log),
            events: events_tx,
            cancel: cancel.clone(),
            header_sent: false,
            summary: SessionSummary {
                id,
                ..Default::default()
            },
        };

        Some(SessionHandle {
            id,
            events: events_rx,
            cancel,
            driver: Some(tokio::spawn(driver.run(pool_size))),
        })
    }
}

/// Consumer side of a running session
pub struct SessionHandle {
    id: Uuid,
    events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
    driver: Option<JoinHandle<SessionSummary>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event; `None` once the session is killed or has ended
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Abort every leg and suppress further events; idempotent
    pub fn kill(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(session_id = %self.id, "Killing federation session");
            self.cancel.cancel();
        }
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the session loop to wind down
    pub async fn finish(mut self) -> SessionSummary {
        let id = self.id;
        match self.driver.take() {
            Some(driver) => driver.await.unwrap_or_else(|e| {
                tracing::warn!(session_id = %id, "Session loop failed: {}", e);
                SessionSummary {
                    id,
                    killed: true,
                    ..Default::default()
                }
            }),
            None => SessionSummary {
                id,
                ..Default::default()
            },
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // Dropping the consumer stops the loop and its legs
        self.cancel.cancel();
    }
}

struct SessionDriver {
    id: Uuid,
    request_id: Uuid,
    queues: Vec<VecDeque<BackendRequest>>,
    tasks: JoinSet<(Worker, LegOutcome)>,
    leg_ctx: Arc<LegContext>,
    log: Arc<dyn FederationLog>,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    header_sent: bool,
    summary: SessionSummary,
}

impl SessionDriver {
    async fn run(mut self, pool_size: usize) -> SessionSummary {
        self.open_pool(pool_size);

        loop {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                joined = self.tasks.join_next() => joined,
            };

            if self.cancel.is_cancelled() {
                self.shutdown().await;
                break;
            }

            match joined {
                Some(Ok((worker, outcome))) => self.close_leg(worker, outcome).await,
                Some(Err(e)) => {
                    tracing::warn!(session_id = %self.id, "Worker task failed: {}", e);
                    self.replace_worker();
                }
                None => self.replace_worker(),
            }

            if self.cancel.is_cancelled() {
                self.shutdown().await;
                break;
            }

            if self.is_exhausted() {
                self.emit(SessionEvent::End).await;
                tracing::debug!(
                    session_id = %self.id,
                    legs = self.summary.legs,
                    bytes = self.summary.bytes,
                    "Federation session exhausted"
                );
                break;
            }
        }

        self.summary
    }

    /// Spread the initial workers round-robin over the groups
    fn open_pool(&mut self, pool_size: usize) {
        let groups = self.queues.len();
        let mut group = 0;
        for index in 0..pool_size {
            let Some(next) = (0..groups)
                .map(|offset| (group + offset) % groups)
                .find(|&g| !self.queues[g].is_empty())
            else {
                break;
            };
            if let Some(request) = self.queues[next].pop_front() {
                self.spawn(Worker::new(index, next), request);
            }
            group = next + 1;
        }
    }

    fn spawn(&mut self, worker: Worker, request: BackendRequest) {
        self.summary.legs += 1;
        let ctx = Arc::clone(&self.leg_ctx);
        self.tasks.spawn(worker.run(request, ctx));
    }

    async fn close_leg(&mut self, mut worker: Worker, outcome: LegOutcome) {
        self.log.leg(&LegRecord {
            request_id: self.request_id,
            session_id: self.id,
            host: outcome.request.host().to_string(),
            path: outcome.request.path().to_string(),
            query: outcome.request.query().to_string(),
            status: outcome.status,
            bytes: outcome.body.len(),
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });

        if outcome.has_payload() {
            if !self.header_sent {
                self.header_sent = true;
                self.emit(SessionEvent::Header).await;
            }
            self.summary.bytes += outcome.body.len();
            self.emit(SessionEvent::Data(LegPayload {
                request: outcome.request,
                status: outcome.status,
                body: outcome.body,
            }))
            .await;
        } else if !(200..300).contains(&outcome.status) {
            tracing::warn!(
                session_id = %self.id,
                host = outcome.request.host(),
                status = outcome.status,
                attempts = outcome.attempts,
                "Backend leg dropped from merge"
            );
        }

        if self.cancel.is_cancelled() {
            return;
        }

        if let Some(group) = self.next_group(worker.group()) {
            if let Some(request) = self.queues[group].pop_front() {
                worker.reassign(group);
                self.spawn(worker, request);
            }
        }
    }

    /// Put a fresh worker on pending work after a worker task was lost
    fn replace_worker(&mut self) {
        if let Some(group) = self.next_group(0) {
            if let Some(request) = self.queues[group].pop_front() {
                let index = self.summary.legs;
                self.spawn(Worker::new(index, group), request);
            }
        }
    }

    /// Own queue first, then the fullest other queue
    fn next_group(&self, own: usize) -> Option<usize> {
        if self.queues.get(own).is_some_and(|q| !q.is_empty()) {
            return Some(own);
        }
        self.queues
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_empty())
            .max_by_key(|(_, q)| q.len())
            .map(|(g, _)| g)
    }

    fn is_exhausted(&self) -> bool {
        self.tasks.is_empty() && self.queues.iter().all(VecDeque::is_empty)
    }

    /// Send unless killed; a vanished consumer kills the session
    async fn emit(&self, event: SessionEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => true,
            sent = self.events.send(event) => sent.is_ok(),
        };
        if !sent {
            self.cancel.cancel();
        }
    }

    async fn shutdown(&mut self) {
        self.summary.killed = true;
        for queue in &mut self.queues {
            queue.clear();
        }
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        tracing::debug!(
            session_id = %self.id,
            legs = self.summary.legs,
            "Federation session killed"
        );
    }
}
