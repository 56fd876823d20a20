//! Response assembly
//!
//! Turns the event stream of a federation session into one client response.
//! A [`Merger`] decides the envelope (content type, preamble, closing) and how
//! each backend payload is trimmed before it is written.

pub mod document;
pub mod expansion;
pub mod mseed;
pub mod output;

use crate::federation::{SessionEvent, SessionHandle, SessionSummary};
use bytes::Bytes;
use output::ResponseWriter;

pub use document::{TextMerger, XmlMerger};

pub const MSEED_CONTENT_TYPE: &str = "application/vnd.fdsn.mseed";

/// Format-specific merging of backend payloads
pub trait Merger: Send {
    fn content_type(&self) -> &'static str;

    /// `Content-Disposition` value, if the response is a download
    fn disposition(&self) -> Option<String> {
        None
    }

    /// Written once, before the first payload
    fn preamble(&mut self) -> Option<Bytes>;

    /// Trim one backend payload for concatenation
    fn chunk(&mut self, body: Bytes) -> Bytes;

    /// Written once, after the last payload
    fn closing(&mut self) -> Option<Bytes>;
}

/// Concatenates miniSEED payloads.
///
/// Every payload after the first loses its leading record; consecutive
/// segments of one channel overlap by one record.
#[derive(Debug, Default)]
pub struct BinaryMerger {
    seen_first: bool,
}

impl BinaryMerger {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Download file name for merged time series
pub fn mseed_filename(created: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "eidafed-{}.mseed",
        created.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    )
}

impl Merger for BinaryMerger {
    fn content_type(&self) -> &'static str {
        MSEED_CONTENT_TYPE
    }

    fn disposition(&self) -> Option<String> {
        Some(format!("attachment;filename={}", mseed_filename(chrono::Utc::now())))
    }

    fn preamble(&mut self) -> Option<Bytes> {
        None
    }

    fn chunk(&mut self, body: Bytes) -> Bytes {
        if !self.seen_first {
            self.seen_first = true;
            return body;
        }
        mseed::strip_first_record(body)
    }

    fn closing(&mut self) -> Option<Bytes> {
        None
    }
}

/// Pump one session into the client response.
///
/// The head is committed on the session's `Header` event; a session that
/// ends or dies before any payload yields no content. A failed write kills
/// the session.
pub async fn stream_session<M: Merger>(
    mut session: SessionHandle,
    mut merger: M,
    writer: &mut ResponseWriter,
) -> SessionSummary {
    let mut started = false;

    while let Some(event) = session.next_event().await {
        match event {
            SessionEvent::Header => {
                started = true;
                writer.open(merger.content_type(), merger.disposition());
                if let Some(preamble) = merger.preamble() {
                    if !writer.write(preamble).await {
                        session.kill();
                        break;
                    }
                }
            }
            SessionEvent::Data(payload) => {
                let chunk = merger.chunk(payload.body);
                if !writer.write(chunk).await {
                    tracing::debug!(session_id = %session.id(), "Client gone, killing session");
                    session.kill();
                    break;
                }
            }
            SessionEvent::End => {
                if started {
                    if let Some(closing) = merger.closing() {
                        writer.write(closing).await;
                    }
                }
                break;
            }
        }
    }

    if !started {
        writer.no_content();
    }
    session.finish().await
}
