use crate::error::{RecastError, RecastErrorKind};
use bytes::Bytes;
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

/// Literal written between serialized messages on files and TCP sinks.
///
/// The sequence cannot occur inside a well-formed HTTP payload, so readers
/// resynchronize by scanning for it.
pub const PAYLOAD_SEPARATOR: &[u8] = "\n\u{1F435}\u{1F648}\u{1F649}\n".as_bytes();

/// Kind of traffic a message carries, encoded as the first byte of its meta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    /// A captured request.
    Request,
    /// A captured response.
    Response,
    /// A response synthesized by replaying a request. Never replayed again.
    ReplayedResponse,
}

impl PayloadType {
    /// The single ASCII digit used on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            PayloadType::Request => b'1',
            PayloadType::Response => b'2',
            PayloadType::ReplayedResponse => b'3',
        }
    }

    /// Decodes the wire digit.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'1' => Some(PayloadType::Request),
            b'2' => Some(PayloadType::Response),
            b'3' => Some(PayloadType::ReplayedResponse),
            _ => None,
        }
    }
}

/// The unit flowing through the pipeline: an opaque meta line plus the raw
/// application-layer bytes. Both buffers are immutable once emitted;
/// middleware and outputs build new messages instead of mutating these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Newline-terminated meta line (`<type> <id> <ts> <latency>\n`).
    pub meta: Bytes,
    /// Raw HTTP request or response bytes. Binary-safe.
    pub data: Bytes,
}

impl Message {
    /// Wraps a meta line and payload into a message.
    pub fn new(meta: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Message {
            meta: meta.into(),
            data: data.into(),
        }
    }

    /// Total size on the wire, excluding the separator.
    pub fn len(&self) -> usize {
        self.meta.len() + self.data.len()
    }

    /// True when both buffers are empty.
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.data.is_empty()
    }

    /// The correlation-ID field of the meta line.
    pub fn id(&self) -> &[u8] {
        payload_id(&self.meta)
    }
}

/// A fully parsed meta line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMeta {
    /// Traffic kind.
    pub payload_type: PayloadType,
    /// Correlation ID bytes (24 hex chars for captured flows).
    pub id: Vec<u8>,
    /// Capture time, nanoseconds since epoch.
    pub timestamp: i64,
    /// Observed server latency for responses; `-1` for requests.
    pub latency: i64,
    /// Offset one past the terminating newline; the payload starts here when
    /// meta and body arrive concatenated.
    pub data_offset: usize,
}

/// Formats a meta line: `<type> <id> <timestamp> <latency>\n`.
pub fn payload_header(payload_type: PayloadType, id: &[u8], timestamp: i64, latency: i64) -> Vec<u8> {
    let mut header = Vec::with_capacity(id.len() + 48);
    header.push(payload_type.as_byte());
    header.push(b' ');
    header.extend_from_slice(id);
    header.push(b' ');
    header.extend_from_slice(timestamp.to_string().as_bytes());
    header.push(b' ');
    header.extend_from_slice(latency.to_string().as_bytes());
    header.push(b'\n');
    header
}

/// Parses a meta line up to and including its terminating newline.
///
/// Fails with `MalformedMeta` on short or non-ASCII input, on fewer than
/// four fields, and on an unknown payload type.
pub fn parse_meta(meta: &[u8]) -> Result<PayloadMeta, RecastError> {
    let newline = meta
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| RecastError::new(RecastErrorKind::MalformedMeta, "meta line not terminated"))?;
    let line = &meta[..newline];
    if !line.is_ascii() {
        return Err(RecastError::new(
            RecastErrorKind::MalformedMeta,
            "meta line is not ASCII",
        ));
    }
    // line is ASCII, so this cannot fail
    let line = std::str::from_utf8(line)
        .map_err(|e| RecastError::new(RecastErrorKind::MalformedMeta, e.to_string()))?;
    let mut fields = line.split_ascii_whitespace();
    let (type_field, id, timestamp, latency) = match (
        fields.next(),
        fields.next(),
        fields.next(),
        fields.next(),
    ) {
        (Some(t), Some(id), Some(ts), Some(lat)) => (t, id, ts, lat),
        _ => {
            return Err(RecastError::new(
                RecastErrorKind::MalformedMeta,
                format!("meta line has fewer than four fields: {:?}", line),
            ));
        }
    };
    let payload_type = type_field
        .as_bytes()
        .first()
        .filter(|_| type_field.len() == 1)
        .and_then(|&b| PayloadType::from_byte(b))
        .ok_or_else(|| {
            RecastError::new(
                RecastErrorKind::MalformedMeta,
                format!("unknown payload type: {:?}", type_field),
            )
        })?;
    Ok(PayloadMeta {
        payload_type,
        id: id.as_bytes().to_vec(),
        timestamp: timestamp.parse::<i64>()?,
        latency: latency.parse::<i64>()?,
        data_offset: newline + 1,
    })
}

/// Splits a concatenated `meta ‖ body` frame at the meta's newline.
///
/// The meta keeps its terminating newline. A frame without one is treated as
/// a plain payload with an empty meta.
pub fn split_meta_and_body(frame: &Bytes) -> (Bytes, Bytes) {
    match frame.iter().position(|&b| b == b'\n') {
        Some(i) if i > 0 && frame.len() > i + 1 => (frame.slice(..i + 1), frame.slice(i + 1..)),
        _ => (Bytes::new(), frame.clone()),
    }
}

/// True for traffic captured from the wire (`payloadType ∈ {1,2}`), false
/// for synthesized replay responses.
pub fn is_origin_payload(meta: &[u8]) -> bool {
    matches!(meta.first(), Some(b'1') | Some(b'2'))
}

/// True only for captured requests.
pub fn is_request_payload(meta: &[u8]) -> bool {
    meta.first() == Some(&b'1')
}

/// The correlation-ID field of a meta line, without parsing the rest.
///
/// Returns an empty slice when the line has no second field.
pub fn payload_id(meta: &[u8]) -> &[u8] {
    let Some(start) = meta.iter().position(|&b| b == b' ') else {
        return &[];
    };
    let id = &meta[start + 1..];
    match id.iter().position(|&b| b == b' ' || b == b'\n') {
        Some(end) => &id[..end],
        None => id,
    }
}

/// Generates a fresh 24-hex-char correlation ID.
pub fn uuid() -> Vec<u8> {
    let mut raw = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw).into_bytes()
}

/// Nanoseconds since the Unix epoch, as carried in meta lines.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// 32-bit FNV-1a, the session hash the router and sticky TCP workers use.
pub fn fnv32a(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in data {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Iterates the separator-framed messages inside a buffer, ignoring empty
/// chunks so leading or trailing separators do not produce ghost frames.
pub fn split_frames(buf: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut rest = buf;
    while let Some(pos) = find_separator(rest) {
        if pos > 0 {
            frames.push(&rest[..pos]);
        }
        rest = &rest[pos + PAYLOAD_SEPARATOR.len()..];
    }
    if !rest.is_empty() {
        frames.push(rest);
    }
    frames
}

/// Position of the next payload separator, if any.
pub fn find_separator(buf: &[u8]) -> Option<usize> {
    if buf.len() < PAYLOAD_SEPARATOR.len() {
        return None;
    }
    buf.windows(PAYLOAD_SEPARATOR.len())
        .position(|w| w == PAYLOAD_SEPARATOR)
}
