use std::fmt;

/// Response body framing, decided from the headers of the response
/// currently being parsed.
#[derive(Debug)]
enum BodyFraming {
    /// No body at all (e.g. a HEAD response, or explicit `Content-Length: 0`).
    None,
    Fixed { remaining: u64 },
    Chunked(ChunkState),
    /// No framing header present; the body runs until the server closes the
    /// connection. Only completeness is tracked, not body bytes, so EOF
    /// (readable returning 0) is what marks this case done.
    UntilClose,
}

#[derive(Debug)]
enum ChunkState {
    Size,
    Data(u64),
    TrailingCrlf,
    Trailers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserError {
    MalformedStatusLine,
    MalformedHeaders,
    InvalidChunkSize,
    TooManyHeaders,
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::MalformedStatusLine => write!(f, "malformed status line"),
            ParserError::MalformedHeaders => write!(f, "malformed response headers"),
            ParserError::InvalidChunkSize => write!(f, "invalid chunk size"),
            ParserError::TooManyHeaders => write!(f, "too many response headers"),
        }
    }
}

impl std::error::Error for ParserError {}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Headers,
    Body,
    Complete,
}

/// Per-connection HTTP/1.1 response parser. Wraps `httparse` for the
/// status-line/header block and layers body-framing and completion
/// detection on top; only status and completeness matter here, never
/// body content.
pub struct ResponseParser {
    header_buf: Vec<u8>,
    state: State,
    framing: BodyFraming,
    pub status: Option<u16>,
    pub server_wants_close: bool,
    pub cookies: Vec<String>,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            header_buf: Vec::with_capacity(512),
            state: State::Headers,
            framing: BodyFraming::None,
            status: None,
            server_wants_close: false,
            cookies: Vec::new(),
        }
    }

    /// Feeds newly-received bytes into the parser. Returns `Ok(true)` once
    /// the response is fully parsed. `capture_cookies` mirrors the `-c`
    /// CLI flag: when false, `Set-Cookie` header scanning is skipped.
    pub fn feed(&mut self, data: &[u8], capture_cookies: bool) -> Result<bool, ParserError> {
        // Owned leftover carries body bytes that arrived in the same read as
        // the tail of the header block; `data` borrows from whichever of
        // `data`/`leftover` is current so no copy loops back into `self`.
        let mut leftover;
        let mut data = data;
        loop {
            match self.state {
                State::Headers => {
                    self.header_buf.extend_from_slice(data);
                    match self.try_parse_headers(capture_cookies)? {
                        Some(consumed) => {
                            leftover = self.header_buf.split_off(consumed);
                            self.header_buf.clear();
                            self.state = State::Body;
                            data = &leftover;
                        }
                        None => return Ok(false),
                    }
                }
                State::Body => {
                    if matches!(self.framing, BodyFraming::None) {
                        self.state = State::Complete;
                        return Ok(true);
                    }
                    if data.is_empty() {
                        return Ok(false);
                    }
                    let done = self.consume_body(data)?;
                    if done {
                        self.state = State::Complete;
                        return Ok(true);
                    }
                    return Ok(false);
                }
                State::Complete => return Ok(true),
            }
        }
    }

    /// Signals that the peer closed the connection (EOF). Only meaningful
    /// for `UntilClose` framing, where EOF is how completion is detected.
    pub fn note_eof(&mut self) -> bool {
        if matches!(self.framing, BodyFraming::UntilClose) {
            self.state = State::Complete;
            true
        } else {
            false
        }
    }

    fn try_parse_headers(&mut self, capture_cookies: bool) -> Result<Option<usize>, ParserError> {
        const MAX_HEADERS: usize = 64;
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(&self.header_buf) {
            Ok(httparse::Status::Complete(consumed)) => {
                self.status = response.code;
                let mut content_length: Option<u64> = None;
                let mut chunked = false;
                let mut close = false;
                for h in response.headers.iter() {
                    let name = h.name;
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = std::str::from_utf8(h.value)
                            .ok()
                            .and_then(|v| v.trim().parse().ok());
                    } else if name.eq_ignore_ascii_case("transfer-encoding") {
                        if let Ok(v) = std::str::from_utf8(h.value) {
                            chunked = v.to_ascii_lowercase().contains("chunked");
                        }
                    } else if name.eq_ignore_ascii_case("connection") {
                        if let Ok(v) = std::str::from_utf8(h.value) {
                            close = v.to_ascii_lowercase().contains("close");
                        }
                    } else if capture_cookies && name.eq_ignore_ascii_case("set-cookie") {
                        if let Ok(v) = std::str::from_utf8(h.value) {
                            self.cookies.push(cookie_pair_only(v));
                        }
                    }
                }
                self.server_wants_close = close;
                self.framing = if chunked {
                    BodyFraming::Chunked(ChunkState::Size)
                } else if let Some(len) = content_length {
                    if len == 0 {
                        BodyFraming::None
                    } else {
                        BodyFraming::Fixed { remaining: len }
                    }
                } else if is_bodyless_status(response.code.unwrap_or(0)) {
                    BodyFraming::None
                } else {
                    BodyFraming::UntilClose
                };
                Ok(Some(consumed))
            }
            Ok(httparse::Status::Partial) => Ok(None),
            Err(httparse::Error::TooManyHeaders) => Err(ParserError::TooManyHeaders),
            Err(httparse::Error::Version | httparse::Error::Status) => Err(ParserError::MalformedStatusLine),
            Err(_) => Err(ParserError::MalformedHeaders),
        }
    }

    /// Consumes body bytes according to the framing decided at header-parse
    /// time. Returns `true` once the body (and any chunk trailer) is fully
    /// accounted for.
    fn consume_body(&mut self, mut data: &[u8]) -> Result<bool, ParserError> {
        loop {
            match &mut self.framing {
                BodyFraming::None => return Ok(true),
                BodyFraming::UntilClose => return Ok(false),
                BodyFraming::Fixed { remaining } => {
                    let take = (*remaining).min(data.len() as u64) as usize;
                    *remaining -= take as u64;
                    data = &data[take..];
                    if *remaining == 0 {
                        return Ok(true);
                    }
                    if data.is_empty() {
                        return Ok(false);
                    }
                }
                BodyFraming::Chunked(chunk_state) => {
                    if data.is_empty() {
                        return Ok(false);
                    }
                    match chunk_state {
                        ChunkState::Size => {
                            let Some(pos) = find_crlf(data) else {
                                return Ok(false);
                            };
                            let size_str = std::str::from_utf8(&data[..pos])
                                .map_err(|_| ParserError::InvalidChunkSize)?;
                            let size_str = size_str.split(';').next().unwrap_or("");
                            let size = u64::from_str_radix(size_str.trim(), 16)
                                .map_err(|_| ParserError::InvalidChunkSize)?;
                            data = &data[pos + 2..];
                            *chunk_state = if size == 0 {
                                ChunkState::Trailers
                            } else {
                                ChunkState::Data(size)
                            };
                        }
                        ChunkState::Data(remaining) => {
                            let take = (*remaining).min(data.len() as u64) as usize;
                            *remaining -= take as u64;
                            data = &data[take..];
                            if *remaining == 0 {
                                *chunk_state = ChunkState::TrailingCrlf;
                            } else if data.is_empty() {
                                return Ok(false);
                            }
                        }
                        ChunkState::TrailingCrlf => {
                            if data.len() < 2 {
                                return Ok(false);
                            }
                            data = &data[2..];
                            *chunk_state = ChunkState::Size;
                        }
                        ChunkState::Trailers => {
                            let Some(pos) = find_crlf(data) else {
                                return Ok(false);
                            };
                            if pos == 0 {
                                return Ok(true);
                            }
                            data = &data[pos + 2..];
                        }
                    }
                }
            }
        }
    }
}

fn is_bodyless_status(code: u16) -> bool {
    matches!(code, 100..=199 | 204 | 304)
}

/// Keeps only `name=value` (drops `Path=`, `Expires=`, etc.) so the echoed
/// `Cookie:` header on the next request stays well-formed.
fn cookie_pair_only(set_cookie_value: &str) -> String {
    set_cookie_value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}
