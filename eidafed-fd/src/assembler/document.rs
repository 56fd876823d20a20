//! Catalog document merging
//!
//! Station backends each return a complete document. The merged response
//! gets one envelope written by the federator; each backend chunk contributes
//! only its inner payload.

use super::Merger;
use bytes::{Bytes, BytesMut};
use eidafed_common::query::Level;

pub const XML_CONTENT_TYPE: &str = "application/xml";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

const XML_NAMESPACE: &str = "http://www.fdsn.org/xml/station/1";
const XML_SOURCE: &str = "EIDA Federator";
const XML_SENDER: &str = "ORFEUS Data Center";
const XML_CLOSING: &str = "</FDSNStationXML>";
const NETWORK_OPEN: &[u8] = b"<Network";
const NETWORK_CLOSE: &[u8] = b"</Network>";

const NETWORK_HEADER: &str = "#Network|Description|StartTime|EndTime|TotalStations";
const STATION_HEADER: &str = "#Network|Station|Latitude|Longitude|Elevation|SiteName|StartTime|EndTime";
const CHANNEL_HEADER: &str = "#Network|Station|Location|Channel|Latitude|Longitude|Elevation|Depth|Azimuth|Dip|SensorDescription|Scale|ScaleFreq|ScaleUnits|SampleRate|StartTime|EndTime";

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Everything from the first `<Network` to the end of the last `</Network>`
pub fn network_slice(document: &Bytes) -> Bytes {
    match (find(document, NETWORK_OPEN), rfind(document, NETWORK_CLOSE)) {
        (Some(start), Some(close)) if close >= start => {
            document.slice(start..close + NETWORK_CLOSE.len())
        }
        _ => Bytes::new(),
    }
}

/// Everything after the first line, newline-terminated
pub fn strip_first_line(document: &Bytes) -> Bytes {
    let body = match document.iter().position(|b| *b == b'\n') {
        Some(newline) => document.slice(newline + 1..),
        None => document.clone(),
    };
    if body.is_empty() || body.ends_with(b"\n") {
        return body;
    }
    let mut terminated = BytesMut::with_capacity(body.len() + 1);
    terminated.extend_from_slice(&body);
    terminated.extend_from_slice(b"\n");
    terminated.freeze()
}

/// Column header line of the text format
pub fn text_header(level: Level) -> &'static str {
    match level {
        Level::Network => NETWORK_HEADER,
        Level::Station => STATION_HEADER,
        Level::Location | Level::Channel => CHANNEL_HEADER,
    }
}

/// FDSNStationXML root opening with federator metadata
pub fn xml_preamble(created: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "<FDSNStationXML xmlns=\"{}\" schemaVersion=\"1.0\"><Source>{}</Source><Sender>{}</Sender><Created>{}</Created>",
        XML_NAMESPACE,
        XML_SOURCE,
        XML_SENDER,
        created.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    )
}

/// Merges FDSNStationXML documents under one root element
#[derive(Debug, Default)]
pub struct XmlMerger;

impl Merger for XmlMerger {
    fn content_type(&self) -> &'static str {
        XML_CONTENT_TYPE
    }

    fn preamble(&mut self) -> Option<Bytes> {
        Some(Bytes::from(xml_preamble(chrono::Utc::now())))
    }

    fn chunk(&mut self, body: Bytes) -> Bytes {
        network_slice(&body)
    }

    fn closing(&mut self) -> Option<Bytes> {
        Some(Bytes::from_static(XML_CLOSING.as_bytes()))
    }
}

/// Merges pipe-delimited text documents under one header line
#[derive(Debug)]
pub struct TextMerger {
    level: Level,
}

impl TextMerger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Merger for TextMerger {
    fn content_type(&self) -> &'static str {
        TEXT_CONTENT_TYPE
    }

    fn preamble(&mut self) -> Option<Bytes> {
        Some(Bytes::from(format!("{}\n", text_header(self.level))))
    }

    fn chunk(&mut self, body: Bytes) -> Bytes {
        strip_first_line(&body)
    }

    fn closing(&mut self) -> Option<Bytes> {
        None
    }
}
