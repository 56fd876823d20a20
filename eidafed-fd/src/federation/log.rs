//! Operational log
//!
//! One [`LegRecord`] per closed backend leg and one [`RequestRecord`] per
//! client request. The sink is injected into the service at startup; nothing
//! here is process-global.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Outcome of one backend leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegRecord {
    pub request_id: Uuid,
    pub session_id: Uuid,
    pub host: String,
    pub path: String,
    pub query: String,
    /// Final HTTP status; 504 for a timeout, 502 for a transport failure
    pub status: u16,
    pub bytes: usize,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub request_id: Uuid,
    pub method: String,
    pub path: String,
    pub query: String,
    pub client: String,
    /// Status sent to the client; 499 when the client went away first
    pub status: u16,
    pub bytes: usize,
    pub legs: usize,
    pub elapsed_ms: u64,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for operational records
pub trait FederationLog: Send + Sync {
    fn leg(&self, record: &LegRecord);
    fn request(&self, record: &RequestRecord);
}

/// Emits records as structured tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl FederationLog for TracingLog {
    fn leg(&self, record: &LegRecord) {
        tracing::info!(
            target: "eidafed::service_request",
            request_id = %record.request_id,
            session_id = %record.session_id,
            host = %record.host,
            path = %record.path,
            query = %record.query,
            status = record.status,
            bytes = record.bytes,
            attempts = record.attempts,
            elapsed_ms = record.elapsed_ms,
            "Service Request"
        );
    }

    fn request(&self, record: &RequestRecord) {
        tracing::info!(
            target: "eidafed::http_request",
            request_id = %record.request_id,
            method = %record.method,
            path = %record.path,
            query = %record.query,
            client = %record.client,
            status = record.status,
            bytes = record.bytes,
            legs = record.legs,
            elapsed_ms = record.elapsed_ms,
            user_agent = record.user_agent.as_deref().unwrap_or("-"),
            "HTTP Request"
        );
    }
}

#[derive(Serialize)]
#[serde(tag = "msg")]
enum Line<'a> {
    #[serde(rename = "Service Request")]
    Leg(&'a LegRecord),
    #[serde(rename = "HTTP Request")]
    Request(&'a RequestRecord),
}

enum Entry {
    Line(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Appends one JSON object per record to a file, and forwards to tracing.
///
/// Records are handed to a writer task over a channel, so logging from the
/// session loop never touches the file itself.
#[derive(Debug)]
pub struct JsonLinesLog {
    tx: mpsc::UnboundedSender<Entry>,
}

impl JsonLinesLog {
    /// Open `path` for appending and start its writer task
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_lines(file, rx));
        Ok(Self { tx })
    }

    /// Wait until every record logged so far has reached the file
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Entry::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    fn append(&self, line: &Line<'_>) {
        let mut json = match serde_json::to_vec(line) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize log record: {}", e);
                return;
            }
        };
        json.push(b'\n');

        if self.tx.send(Entry::Line(json)).is_err() {
            tracing::warn!("Operational log writer has stopped");
        }
    }
}

async fn write_lines(mut file: File, mut rx: mpsc::UnboundedReceiver<Entry>) {
    while let Some(entry) = rx.recv().await {
        match entry {
            Entry::Line(json) => {
                if let Err(e) = file.write_all(&json).await {
                    tracing::warn!("Failed to write operational log: {}", e);
                }
            }
            Entry::Flush(ack) => {
                if let Err(e) = file.flush().await {
                    tracing::warn!("Failed to flush operational log: {}", e);
                }
                let _ = ack.send(());
            }
        }
    }

    if let Err(e) = file.flush().await {
        tracing::warn!("Failed to flush operational log: {}", e);
    }
}

impl FederationLog for JsonLinesLog {
    fn leg(&self, record: &LegRecord) {
        TracingLog.leg(record);
        self.append(&Line::Leg(record));
    }

    fn request(&self, record: &RequestRecord) {
        TracingLog.request(record);
        self.append(&Line::Request(record));
    }
}

/// Keeps records in memory; used to inspect what a request did
#[derive(Debug, Default)]
pub struct MemoryLog {
    legs: Mutex<Vec<LegRecord>>,
    requests: Mutex<Vec<RequestRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn legs(&self) -> Vec<LegRecord> {
        self.legs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl FederationLog for MemoryLog {
    fn leg(&self, record: &LegRecord) {
        if let Ok(mut legs) = self.legs.lock() {
            legs.push(record.clone());
        }
    }

    fn request(&self, record: &RequestRecord) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(record.clone());
        }
    }
}
