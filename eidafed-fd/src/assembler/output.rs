//! Client response plumbing
//!
//! The federation task and the HTTP handler are connected by a
//! [`ResponseWriter`] / [`PendingResponse`] pair. The handler waits for the
//! response head (content or no content), then streams body chunks as the
//! writer produces them. Dropping the streamed body (client disconnect)
//! cancels the request token, which stops every session hanging off it.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Body chunks buffered ahead of the client
const BODY_BUFFER: usize = 32;

/// How the response starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseHead {
    Content {
        content_type: &'static str,
        disposition: Option<String>,
    },
    NoContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    Pending,
    Content,
    NoContent,
}

/// Federation-task side: decides the head and writes body chunks
#[derive(Debug)]
pub struct ResponseWriter {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    state: HeadState,
    bytes_written: usize,
    disconnected: bool,
}

/// Handler side: turns into the HTTP response once the head is known
#[derive(Debug)]
pub struct PendingResponse {
    head: oneshot::Receiver<ResponseHead>,
    body: mpsc::Receiver<Bytes>,
    guard: DropGuard,
}

/// Create a connected writer/response pair bound to a request token
pub fn channel(cancel: CancellationToken) -> (ResponseWriter, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);

    let writer = ResponseWriter {
        head: Some(head_tx),
        body: body_tx,
        cancel: cancel.clone(),
        state: HeadState::Pending,
        bytes_written: 0,
        disconnected: false,
    };
    let pending = PendingResponse {
        head: head_rx,
        body: body_rx,
        guard: cancel.drop_guard(),
    };
    (writer, pending)
}

impl ResponseWriter {
    /// Commit to a 200 response with the given content headers
    pub fn open(&mut self, content_type: &'static str, disposition: Option<String>) {
        self.send_head(ResponseHead::Content {
            content_type,
            disposition,
        });
    }

    /// Commit to an empty 204 response
    pub fn no_content(&mut self) {
        self.send_head(ResponseHead::NoContent);
    }

    fn send_head(&mut self, head: ResponseHead) {
        let Some(sender) = self.head.take() else {
            return;
        };
        let state = match head {
            ResponseHead::Content { .. } => HeadState::Content,
            ResponseHead::NoContent => HeadState::NoContent,
        };
        if sender.send(head).is_err() || self.cancel.is_cancelled() {
            self.disconnected = true;
        }
        self.state = state;
    }

    /// Write one body chunk; `false` once the client is gone
    pub async fn write(&mut self, chunk: Bytes) -> bool {
        if self.disconnected || self.state != HeadState::Content {
            return false;
        }
        if chunk.is_empty() {
            return true;
        }
        let len = chunk.len();
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.body.send(chunk) => sent.is_ok(),
        };
        if sent {
            self.bytes_written += len;
        } else {
            self.disconnected = true;
        }
        sent
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// True when the client went away before the response completed
    pub fn is_disconnected(&self) -> bool {
        self.disconnected || (self.state != HeadState::NoContent && self.cancel.is_cancelled())
    }

    /// Status to record for this request: 204, 200, or 499 on disconnect
    pub fn final_status(&self) -> u16 {
        match self.state {
            HeadState::NoContent if !self.disconnected => 204,
            _ if self.is_disconnected() => 499,
            HeadState::Content => 200,
            _ => 204,
        }
    }
}

impl PendingResponse {
    /// Wait for the head and build the response around the body channel
    pub async fn into_response(self) -> Response {
        let PendingResponse { head, body, guard } = self;

        match head.await {
            Ok(ResponseHead::Content {
                content_type,
                disposition,
            }) => {
                let stream = GuardedBody {
                    inner: ReceiverStream::new(body),
                    _guard: guard,
                };
                let mut builder = Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, content_type);
                if let Some(disposition) = disposition {
                    builder = builder.header(header::CONTENT_DISPOSITION, disposition);
                }
                builder
                    .body(Body::from_stream(stream))
                    .unwrap_or_else(|e| {
                        tracing::error!("Failed to build streamed response: {}", e);
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    })
            }
            Ok(ResponseHead::NoContent) => StatusCode::NO_CONTENT.into_response(),
            Err(_) => {
                tracing::warn!("Federation task ended without a response head");
                StatusCode::NO_CONTENT.into_response()
            }
        }
    }
}

/// Body stream that cancels the request token when dropped
struct GuardedBody {
    inner: ReceiverStream<Bytes>,
    _guard: DropGuard,
}

impl Stream for GuardedBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|chunk| chunk.map(Ok))
    }
}
