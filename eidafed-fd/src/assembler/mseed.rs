//! miniSEED record framing
//!
//! Only as much of the SEED fixed header is decoded as the binary merge needs:
//! enough to validate the record and find its length in blockette 1000.
//!
//! Fixed header layout (48 bytes):
//!
//! | offset | field                                  |
//! |--------|----------------------------------------|
//! | 0      | sequence number, 6 ASCII digits        |
//! | 6      | quality indicator `D` `R` `Q` `M`      |
//! | 8      | station, location, channel, network    |
//! | 20     | BTIME start (year first)               |
//! | 39     | number of blockettes that follow       |
//! | 46     | offset of the first blockette          |

use bytes::Bytes;
use thiserror::Error;

const FIXED_HEADER_LEN: usize = 48;
const BLOCKETTE_1000: u16 = 1000;
const MIN_RECORD_EXPONENT: u8 = 7;
const MAX_RECORD_EXPONENT: u8 = 20;

/// Malformed record framing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MseedError {
    #[error("record shorter than fixed header ({0} bytes)")]
    Truncated(usize),

    #[error("invalid sequence number")]
    Sequence,

    #[error("invalid quality indicator {0:#04x}")]
    Quality(u8),

    #[error("cannot determine byte order")]
    ByteOrder,

    #[error("blockette 1000 not found")]
    MissingBlockette1000,

    #[error("invalid record length exponent {0}")]
    RecordLength(u8),
}

/// Decoded fixed-header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub quality: char,
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub big_endian: bool,
    /// Total record length in bytes
    pub record_length: usize,
}

impl RecordHeader {
    /// SEED stream identifier, `NET.STA.LOC.CHA`
    pub fn stream_id(&self) -> String {
        format!("{}.{}.{}.{}", self.network, self.station, self.location, self.channel)
    }
}

#[derive(Clone, Copy)]
struct Reader<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl Reader<'_> {
    fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(offset..offset + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }
}

fn ascii_field(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim().to_string()
}

/// Parse the fixed header at the start of `data`
pub fn parse_header(data: &[u8]) -> Result<RecordHeader, MseedError> {
    if data.len() < FIXED_HEADER_LEN {
        return Err(MseedError::Truncated(data.len()));
    }

    if !data[..6].iter().all(|b| b.is_ascii_digit() || *b == b' ') {
        return Err(MseedError::Sequence);
    }

    let quality = data[6];
    if !matches!(quality, b'D' | b'R' | b'Q' | b'M') {
        return Err(MseedError::Quality(quality));
    }

    let reader = [true, false]
        .into_iter()
        .map(|big_endian| Reader { data, big_endian })
        .find(|r| r.u16_at(20).is_some_and(|year| (1900..=2100).contains(&year)))
        .ok_or(MseedError::ByteOrder)?;

    let record_length = record_length(reader, data[39])?;

    Ok(RecordHeader {
        quality: quality as char,
        station: ascii_field(&data[8..13]),
        location: ascii_field(&data[13..15]),
        channel: ascii_field(&data[15..18]),
        network: ascii_field(&data[18..20]),
        big_endian: reader.big_endian,
        record_length,
    })
}

/// Walk the blockette chain to blockette 1000
fn record_length(reader: Reader<'_>, count: u8) -> Result<usize, MseedError> {
    let mut offset = reader.u16_at(46).unwrap_or_default() as usize;

    for _ in 0..count {
        if offset < FIXED_HEADER_LEN {
            break;
        }
        let (Some(kind), Some(next)) = (reader.u16_at(offset), reader.u16_at(offset + 2)) else {
            break;
        };

        if kind == BLOCKETTE_1000 {
            let exponent = *reader
                .data
                .get(offset + 6)
                .ok_or(MseedError::MissingBlockette1000)?;
            if !(MIN_RECORD_EXPONENT..=MAX_RECORD_EXPONENT).contains(&exponent) {
                return Err(MseedError::RecordLength(exponent));
            }
            return Ok(1usize << exponent);
        }

        let next = next as usize;
        if next <= offset {
            break;
        }
        offset = next;
    }

    Err(MseedError::MissingBlockette1000)
}

/// Drop the leading record of a chunk.
///
/// Chunks whose first record cannot be parsed, or that are shorter than the
/// record they announce, are returned unchanged.
pub fn strip_first_record(chunk: Bytes) -> Bytes {
    match parse_header(&chunk) {
        Ok(header) if header.record_length <= chunk.len() => {
            tracing::trace!(
                stream = %header.stream_id(),
                quality = %header.quality,
                record_length = header.record_length,
                "Dropping boundary record"
            );
            chunk.slice(header.record_length..)
        }
        Ok(header) => {
            tracing::debug!(
                stream = %header.stream_id(),
                record_length = header.record_length,
                chunk = chunk.len(),
                "Record longer than chunk, passing through"
            );
            chunk
        }
        Err(e) => {
            tracing::debug!("Unparseable record header, passing through: {}", e);
            chunk
        }
    }
}
