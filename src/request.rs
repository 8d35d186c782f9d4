use std::sync::Arc;

use crate::prelude::{HTTP_CONTENT_LENGTH_DIGITS_MAX, USER_AGENT};
use crate::rng;
use crate::template::{Body, ConnectionTemplate};

/// What follows the header block of a prepared request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// No body: the header buffers already end in the terminating CRLF.
    None,
    /// `Content-Length` body: the bytes are already appended to both header
    /// buffers, so there is nothing further to stream.
    Content,
    /// `Transfer-Encoding: chunked` body backed by a pre-filled raw random
    /// buffer. `total_size` is the logical body length the chunk stream
    /// must add up to; `raw` holds `min(total_size, MAX_REQ_LEN)` bytes
    /// that the connection state machine frames into chunks (and replays
    /// cyclically) at write time. Kept behind an `Arc` so the write loop
    /// can hand out a reference-counted handle per dispatch instead of
    /// deep-copying up to `MAX_REQ_LEN` bytes on every chunk frame.
    Random { total_size: usize, raw: Arc<[u8]> },
}

/// The two pre-serialized requests a connection ever sends: one assuming
/// another request will follow on the same socket, one that tells the
/// server this is the last request on this connection.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub keep_alive: Vec<u8>,
    pub close: Vec<u8>,
    pub body: RequestBody,
}

/// Builds `R_keep`/`R_close` for one connection. Deterministic in the
/// template's visible fields, the sibling index (random-body seeding) and
/// the current cookie string — call again whenever captured cookies change.
pub fn build(template: &ConnectionTemplate, sibling_index: u32, cookies: Option<&str>) -> PreparedRequest {
    let mut keep_alive = request_line_and_common_headers(template);
    let mut close = keep_alive.clone();

    if let Some(cookie_value) = cookies.filter(|cookie| !cookie.is_empty()) {
        let line = format!("Cookie: {cookie_value}\r\n");
        keep_alive.extend_from_slice(line.as_bytes());
        close.extend_from_slice(line.as_bytes());
    }

    close.extend_from_slice(b"Connection: close\r\n");

    let body = match &template.body {
        Body::None => {
            keep_alive.extend_from_slice(b"\r\n");
            close.extend_from_slice(b"\r\n");
            RequestBody::None
        }
        Body::Content(bytes) => {
            append_content_body(&mut keep_alive, bytes);
            append_content_body(&mut close, bytes);
            RequestBody::Content
        }
        Body::Random { size } => {
            keep_alive.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            close.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            let cap = rng::buffer_capacity_for(*size);
            let mut raw = vec![0u8; cap];
            rng::fill_random_body(template.index, sibling_index, &mut raw);
            RequestBody::Random {
                total_size: *size,
                raw: Arc::from(raw),
            }
        }
    };

    PreparedRequest {
        keep_alive,
        close,
        body,
    }
}

fn request_line_and_common_headers(template: &ConnectionTemplate) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(format!("{} {} HTTP/1.1\r\n", template.method, template.path).as_bytes());

    if template.default_port_for_scheme() {
        buf.extend_from_slice(format!("Host: {}\r\n", template.host).as_bytes());
    } else {
        buf.extend_from_slice(format!("Host: {}:{}\r\n", template.host, template.port).as_bytes());
    }

    buf.extend_from_slice(format!("User-Agent: {USER_AGENT}\r\n").as_bytes());
    buf.extend_from_slice(b"Accept: */*\r\n");

    for (name, value) in &template.headers {
        buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    buf
}

fn append_content_body(buf: &mut Vec<u8>, content: &[u8]) {
    let len_str = content.len().to_string();
    debug_assert!(len_str.len() <= HTTP_CONTENT_LENGTH_DIGITS_MAX);
    buf.extend_from_slice(format!("Content-Length: {len_str}\r\n\r\n").as_bytes());
    buf.extend_from_slice(content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ClosePolicy, Scheme, TcpKeepAlive};

    fn base_template() -> ConnectionTemplate {
        ConnectionTemplate {
            index: 0,
            host: "example.test".to_string(),
            port: 80,
            host_from: None,
            scheme: Scheme::Http,
            method: "GET".to_string(),
            path: "/".to_string(),
            headers: vec![],
            body: Body::None,
            tcp_keep_alive: TcpKeepAlive::default(),
            close: ClosePolicy::default(),
            reqs_max: 0,
            keep_alive_reqs: 0,
            tls_session_reuse: false,
            delay_min_ms: 0,
            delay_max_ms: 0,
            ramp_up_ms: 0,
            clients: 1,
        }
    }

    #[test]
    fn keep_alive_omits_connection_header() {
        let t = base_template();
        let req = build(&t, 0, None);
        let text = String::from_utf8(req.keep_alive.clone()).unwrap();
        assert!(!text.contains("Connection:"));
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.test\r\n"));
    }

    #[test]
    fn close_variant_carries_connection_close() {
        let t = base_template();
        let req = build(&t, 0, None);
        let text = String::from_utf8(req.close.clone()).unwrap();
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn nondefault_port_is_included_in_host_header() {
        let mut t = base_template();
        t.port = 8080;
        let req = build(&t, 0, None);
        let text = String::from_utf8(req.keep_alive.clone()).unwrap();
        assert!(text.contains("Host: example.test:8080\r\n"));
    }

    #[test]
    fn content_body_uses_content_length() {
        let mut t = base_template();
        t.body = Body::Content(b"hello".to_vec());
        let req = build(&t, 0, None);
        let text = String::from_utf8(req.keep_alive.clone()).unwrap();
        assert!(text.contains("Content-Length: 5\r\n\r\nhello"));
    }

    #[test]
    fn random_body_uses_chunked_header_only() {
        let mut t = base_template();
        t.body = Body::Random { size: 1_048_576 };
        let req = build(&t, 0, None);
        let text = String::from_utf8(req.keep_alive.clone()).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n\r\n"));
        assert!(!text.contains("Content-Length"));
        match req.body {
            RequestBody::Random { total_size, raw } => {
                assert_eq!(total_size, 1_048_576);
                assert_eq!(raw.len(), 1_048_576);
            }
            _ => panic!("expected Random body"),
        }
    }

    #[test]
    fn cookie_header_only_present_when_captured() {
        let t = base_template();
        let without = build(&t, 0, None);
        assert!(!String::from_utf8_lossy(&without.keep_alive).contains("Cookie:"));

        let with = build(&t, 0, Some("sid=abc"));
        assert!(String::from_utf8_lossy(&with.keep_alive).contains("Cookie: sid=abc\r\n"));
    }

    #[test]
    fn distinct_siblings_get_distinct_random_bodies() {
        let mut t = base_template();
        t.body = Body::Random { size: 64 };
        let a = build(&t, 0, None);
        let b = build(&t, 1, None);
        match (a.body, b.body) {
            (RequestBody::Random { raw: ra, .. }, RequestBody::Random { raw: rb, .. }) => {
                assert_ne!(ra, rb);
            }
            _ => panic!("expected Random bodies"),
        }
    }
}
