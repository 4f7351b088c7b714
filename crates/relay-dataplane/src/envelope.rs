//! Envelope Codec
//!
//! Every record travels as a one-line text header glued to the raw protocol
//! payload:
//!
//! ```text
//! Full form:     <kind> <id:24> <timestamp> <latency>\n<body>
//! Capture form:  <kind> <id:24> <ack>\n<body>
//! ```
//!
//! The form is decided once, by the number of space-separated fields before
//! the newline. Decoding is read-only over the caller's buffer: the body is
//! returned as an offset into the original frame, so the frame that gets
//! forwarded is always the frame that arrived.

use bytes::{BufMut, Bytes, BytesMut};
use relay_common::{CorrelationKey, RecordId, RecordKind, RelayError, Timestamp, LATENCY_UNKNOWN};
use std::io::Write;

/// Field separator inside the header line
const FIELD_SEP: u8 = b' ';

/// Header terminator
const TERMINATOR: u8 = b'\n';

/// Header shape, fixed at decode time by field count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderShape<'a> {
    /// Four fields: producer timing is present
    Full {
        /// Producer timestamp
        timestamp: Timestamp,
        /// Latency in nanoseconds, `LATENCY_UNKNOWN` when not applicable
        latency: i64,
    },
    /// Three fields: live-capture framing, third field is the ACK token
    Capture {
        /// ACK token (variant source, never latency)
        ack: &'a [u8],
    },
}

/// Decoded (or to-be-encoded) envelope header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<'a> {
    /// Record kind
    pub kind: RecordKind,
    /// Record identity
    pub id: RecordId,
    /// Wire form
    pub shape: HeaderShape<'a>,
}

impl<'a> Header<'a> {
    /// Full-form header
    pub fn full(kind: RecordKind, id: RecordId, timestamp: Timestamp, latency: i64) -> Self {
        Self {
            kind,
            id,
            shape: HeaderShape::Full { timestamp, latency },
        }
    }

    /// Capture-form header. The ACK token must be printable, non-space ASCII.
    pub fn capture(kind: RecordKind, id: RecordId, ack: &'a [u8]) -> Result<Self, EnvelopeError> {
        if ack.is_empty() || !ack.iter().all(u8::is_ascii_graphic) {
            return Err(EnvelopeError::BadAck);
        }
        Ok(Self {
            kind,
            id,
            shape: HeaderShape::Capture { ack },
        })
    }

    /// Producer timestamp, `None` for capture-form headers
    #[inline]
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self.shape {
            HeaderShape::Full { timestamp, .. } => Some(timestamp),
            HeaderShape::Capture { .. } => None,
        }
    }

    /// Latency, `LATENCY_UNKNOWN` for capture-form headers
    #[inline]
    pub fn latency(&self) -> i64 {
        match self.shape {
            HeaderShape::Full { latency, .. } => latency,
            HeaderShape::Capture { .. } => LATENCY_UNKNOWN,
        }
    }

    /// Correlation key of the record id
    #[inline]
    pub fn correlation_key(&self) -> CorrelationKey {
        self.id.correlation_key()
    }

    /// Encode the header line, terminator included
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.kind.as_wire());
        out.push(FIELD_SEP);
        out.extend_from_slice(self.id.as_bytes());
        out.push(FIELD_SEP);
        match self.shape {
            HeaderShape::Full { timestamp, latency } => {
                // Writing into a Vec cannot fail
                let _ = write!(out, "{} {}", timestamp.as_nanos(), latency);
            }
            HeaderShape::Capture { ack } => out.extend_from_slice(ack),
        }
        out.push(TERMINATOR);
    }
}

/// Build a complete frame: header line followed by the untouched body
pub fn frame(header: &Header<'_>, body: &[u8]) -> Bytes {
    let head = header.encode();
    let mut buf = BytesMut::with_capacity(head.len() + body.len());
    buf.put_slice(&head);
    buf.put_slice(body);
    buf.freeze()
}

/// A decoded frame: parsed header plus bounds into the original bytes
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    /// Parsed header
    pub header: Header<'a>,
    /// Offset of the first body byte in `frame`
    pub body_offset: usize,
    frame: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Body bytes, borrowed from the original frame
    #[inline]
    pub fn body(&self) -> &'a [u8] {
        &self.frame[self.body_offset..]
    }

    /// The whole original frame
    #[inline]
    pub fn frame(&self) -> &'a [u8] {
        self.frame
    }
}

/// Decode a frame header without copying or touching the body
pub fn decode(frame: &[u8]) -> Result<Envelope<'_>, EnvelopeError> {
    let line_end = frame
        .iter()
        .position(|&b| b == TERMINATOR)
        .ok_or(EnvelopeError::MissingTerminator)?;

    let mut fields: [&[u8]; 4] = [&[]; 4];
    let mut count = 0;
    for field in frame[..line_end].split(|&b| b == FIELD_SEP) {
        if count == fields.len() {
            return Err(EnvelopeError::FieldCount(count + 1));
        }
        fields[count] = field;
        count += 1;
    }

    let kind = match fields[0] {
        [b] => RecordKind::from_wire(*b).ok_or(EnvelopeError::BadKind)?,
        _ => return Err(EnvelopeError::BadKind),
    };
    let id = RecordId::from_bytes(fields[1]).ok_or(EnvelopeError::BadId)?;

    let header = match count {
        4 => {
            let timestamp = parse_i64(fields[2]).ok_or(EnvelopeError::BadTimestamp)?;
            let latency = parse_i64(fields[3]).ok_or(EnvelopeError::BadLatency)?;
            Header::full(kind, id, Timestamp::from_nanos(timestamp), latency)
        }
        3 => Header::capture(kind, id, fields[2])?,
        n => return Err(EnvelopeError::FieldCount(n)),
    };

    Ok(Envelope {
        header,
        body_offset: line_end + 1,
        frame,
    })
}

#[inline]
fn parse_i64(field: &[u8]) -> Option<i64> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Envelope decoding errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Header line has no newline
    #[error("no header terminator")]
    MissingTerminator,

    /// Header is neither the full nor the capture form
    #[error("expected 3 or 4 header fields, found {0}")]
    FieldCount(usize),

    /// First field is not a known kind byte
    #[error("unknown record kind")]
    BadKind,

    /// Id field is not a valid record id
    #[error("record id is not 24 printable characters")]
    BadId,

    /// Timestamp field does not parse
    #[error("timestamp is not an integer")]
    BadTimestamp,

    /// Latency field does not parse
    #[error("latency is not an integer")]
    BadLatency,

    /// Capture-form ack is empty or not printable
    #[error("ack token is empty or not printable")]
    BadAck,
}

impl From<EnvelopeError> for RelayError {
    fn from(err: EnvelopeError) -> Self {
        RelayError::MalformedEnvelope(err.to_string())
    }
}
