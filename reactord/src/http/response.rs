//! Response framing: the bytes written around a handler's body (spec §6).

use crate::http::mime::mime_for_path;
use crate::http::status::HttpStatus;
use bytes::{BufMut, BytesMut};

/// Where a handler writes its response entity. This is
/// `ConnectionState::response_buffer` itself — reused across requests on
/// the same connection (invariant 6), never reallocated by this module.
pub type ResponseBuf = BytesMut;

/// Render a status line and headers for the body already sitting in
/// `body`. Returned separately from `body` rather than prepended to it,
/// so `body`'s allocation (the connection's persistent response buffer)
/// is never shifted or reallocated.
pub fn render_headers(status: HttpStatus, path: &str, keep_alive: bool, body_len: usize) -> BytesMut {
    let content_type = mime_for_path(path);
    let mut headers = BytesMut::with_capacity(128 + content_type.len());
    headers.put_slice(b"HTTP/1.1 ");
    headers.put_slice(status.code().to_string().as_bytes());
    headers.put_slice(b" ");
    headers.put_slice(status.as_str().as_bytes());
    headers.put_slice(b"\r\nContent-Type: ");
    headers.put_slice(content_type.as_bytes());
    headers.put_slice(b"\r\nContent-Length: ");
    headers.put_slice(body_len.to_string().as_bytes());
    headers.put_slice(b"\r\nConnection: ");
    headers.put_slice(if keep_alive { b"keep-alive" } else { b"close" });
    headers.put_slice(b"\r\n\r\n");
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_expected_header_block() {
        let headers = render_headers(HttpStatus::Ok, "/index.htm", true, 11);
        let text = std::str::from_utf8(&headers).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn connection_close_when_not_keep_alive() {
        let headers = render_headers(HttpStatus::NotFound, "/x", false, 0);
        let text = std::str::from_utf8(&headers).unwrap();
        assert!(text.contains("Connection: close\r\n"));
    }
}
