//! Minimal request representation and request-line/header parsing.
//!
//! Full HTTP/1.1 parsing is explicitly out of scope (spec §1): this is a
//! reference implementation just complete enough to drive the reactor
//! and router end to end, not a production parser.

use crate::core::connection::{QueryParams, EMPTY_QUERY_PARAMS};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Header block incomplete; the caller should read more and retry.
    Incomplete,
    InvalidFormat,
    TooLarge,
}

/// A parsed request line plus the headers we care about. Borrows from
/// the connection's read buffer.
pub struct RequestCtx<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query_params: QueryParams,
    pub keep_alive: bool,
    pub consumed: usize,
}

const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Parse one HTTP/1.1 request out of `buf`. Returns `Incomplete` if the
/// terminating `\r\n\r\n` hasn't arrived yet.
pub fn parse_request(buf: &[u8]) -> Result<RequestCtx<'_>, ParseError> {
    if buf.len() > MAX_HEADER_BYTES {
        return Err(ParseError::TooLarge);
    }

    let header_end = match find_subslice(buf, b"\r\n\r\n") {
        Some(pos) => pos + 4,
        None => return Err(ParseError::Incomplete),
    };

    let text = std::str::from_utf8(&buf[..header_end]).map_err(|_| ParseError::InvalidFormat)?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or(ParseError::InvalidFormat)?;

    let mut parts = request_line.split(' ');
    let method = parts.next().ok_or(ParseError::InvalidFormat)?;
    let target = parts.next().ok_or(ParseError::InvalidFormat)?;
    let version = parts.next().ok_or(ParseError::InvalidFormat)?;
    if !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidFormat);
    }

    let (path, query_params) = split_target(target);

    let mut keep_alive = version.ends_with("1.1");
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("connection") {
                let value = value.trim();
                keep_alive = value.eq_ignore_ascii_case("keep-alive");
            }
        }
    }

    Ok(RequestCtx {
        method,
        path,
        query_params,
        keep_alive,
        consumed: header_end,
    })
}

fn split_target(target: &str) -> (&str, QueryParams) {
    match target.split_once('?') {
        None => (target, EMPTY_QUERY_PARAMS.clone()),
        Some((path, query)) if query.is_empty() => (path, EMPTY_QUERY_PARAMS.clone()),
        Some((path, query)) => {
            let pairs: Vec<(String, String)> = query
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect();
            (path, Arc::new(pairs))
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
