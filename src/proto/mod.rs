//! Helpers for inspecting and rewriting raw HTTP/1.1 payload bytes.
//!
//! Captured messages carry the full request head and body verbatim; these
//! functions parse just enough of that to route, replay, or rewrite it.
//! Every mutation produces a fresh buffer; captured payloads are immutable.

use crate::error::{RecastError, RecastErrorKind};

const MAX_HEADERS: usize = 64;

/// Borrowed view of a parsed request payload.
#[derive(Debug)]
pub struct RequestInfo<'a> {
    /// Request method, e.g. `GET`.
    pub method: &'a str,
    /// Path plus query string, exactly as captured.
    pub path: &'a str,
    /// HTTP/1.x minor version.
    pub version: u8,
    /// Header name/value pairs in capture order.
    pub headers: Vec<(&'a str, &'a [u8])>,
    /// Body bytes following the head.
    pub body: &'a [u8],
}

impl RequestInfo<'_> {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }
}

/// Parses a complete request head out of raw payload bytes.
pub fn parse_request(data: &[u8]) -> Result<RequestInfo<'_>, RecastError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(data) {
        Ok(httparse::Status::Complete(offset)) => Ok(RequestInfo {
            method: req.method.unwrap_or(""),
            path: req.path.unwrap_or("/"),
            version: req.version.unwrap_or(1),
            headers: req
                .headers
                .iter()
                .map(|h| (h.name, h.value))
                .collect(),
            body: &data[offset..],
        }),
        Ok(httparse::Status::Partial) => Err(RecastError::new(
            RecastErrorKind::MalformedMeta,
            "incomplete request head",
        )),
        Err(e) => Err(RecastError::new(
            RecastErrorKind::MalformedMeta,
            format!("bad request payload: {}", e),
        )),
    }
}

/// Serializes a parsed request back to raw bytes.
pub fn rebuild_request(
    method: &str,
    path: &str,
    version: u8,
    headers: &[(impl AsRef<str>, impl AsRef<[u8]>)],
    body: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 256);
    out.extend_from_slice(method.as_bytes());
    out.push(b' ');
    out.extend_from_slice(path.as_bytes());
    out.extend_from_slice(b" HTTP/1.");
    out.push(b'0' + version);
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_ref().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_ref());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Returns a copy of the payload with the header set, replacing an existing
/// value or appending a new header line.
pub fn set_header(data: &[u8], name: &str, value: &[u8]) -> Result<Vec<u8>, RecastError> {
    let info = parse_request(data)?;
    let mut headers: Vec<(String, Vec<u8>)> = Vec::with_capacity(info.headers.len() + 1);
    let mut replaced = false;
    for (n, v) in &info.headers {
        if n.eq_ignore_ascii_case(name) {
            headers.push((n.to_string(), value.to_vec()));
            replaced = true;
        } else {
            headers.push((n.to_string(), v.to_vec()));
        }
    }
    if !replaced {
        headers.push((name.to_string(), value.to_vec()));
    }
    Ok(rebuild_request(
        info.method,
        info.path,
        info.version,
        &headers,
        info.body,
    ))
}

/// Returns a copy of the payload without the named header.
pub fn delete_header(data: &[u8], name: &str) -> Result<Vec<u8>, RecastError> {
    let info = parse_request(data)?;
    let headers: Vec<(&str, &[u8])> = info
        .headers
        .iter()
        .filter(|(n, _)| !n.eq_ignore_ascii_case(name))
        .copied()
        .collect();
    Ok(rebuild_request(
        info.method,
        info.path,
        info.version,
        &headers,
        info.body,
    ))
}

/// Returns a copy of the payload with the request path replaced.
pub fn set_path(data: &[u8], path: &str) -> Result<Vec<u8>, RecastError> {
    let info = parse_request(data)?;
    Ok(rebuild_request(
        info.method,
        path,
        info.version,
        &info.headers,
        info.body,
    ))
}

/// Case-insensitive header lookup over raw payload bytes.
pub fn header_value<'a>(data: &'a [u8], name: &str) -> Option<&'a [u8]> {
    parse_request(data).ok().and_then(|info| {
        info.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    })
}
