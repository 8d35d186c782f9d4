mod transport;

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use mio::{Interest, Poll, Token};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::Result;
use crate::http::ResponseParser;
use crate::net;
use crate::request::{self, PreparedRequest, RequestBody};
use crate::scheduler;
use crate::shutdown::Shutdown;
use crate::stats::{ConnStats, ErrorCounters};
use crate::template::{ConnectionTemplate, Scheme};
use transport::{Transport, TlsStream};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    /// Never connected yet, or waiting out the per-connection ramp-up delay
    /// before the very first connect attempt.
    Idle,
    Connecting,
    Handshaking,
    Writing,
    Reading,
    /// Waiting on the inter-request timer before the next Writing cycle on
    /// the same socket.
    Delaying,
    Retired,
}

/// A pending chunked-body write: how much of the logical random body is
/// still unsent, the cyclic read offset into the pre-filled raw buffer, and
/// the chunk frame currently being drained onto the wire.
struct ChunkWrite {
    unsent: usize,
    offset: usize,
    frame: Vec<u8>,
    frame_pos: usize,
    terminal_sent: bool,
}

impl ChunkWrite {
    fn new(total_size: usize) -> Self {
        ChunkWrite {
            unsent: total_size,
            offset: 0,
            frame: Vec::new(),
            frame_pos: 0,
            terminal_sent: false,
        }
    }

    fn fill_next_frame(&mut self, raw: &[u8]) {
        if self.unsent == 0 {
            self.frame = b"0\r\n\r\n".to_vec();
            self.terminal_sent = true;
        } else {
            let cap = (crate::prelude::SEND_BUF_SIZE.saturating_sub(32)).max(1);
            let contiguous = raw.len() - self.offset;
            let take = self.unsent.min(cap).min(contiguous.max(1));
            let take = take.min(raw.len().max(1));
            let take = take.max(1).min(self.unsent);
            let chunk = &raw[self.offset..self.offset + take];
            let mut frame = format!("{take:x}\r\n").into_bytes();
            frame.extend_from_slice(chunk);
            frame.extend_from_slice(b"\r\n");
            self.frame = frame;
            self.offset = (self.offset + take) % raw.len().max(1);
            self.unsent -= take;
        }
        self.frame_pos = 0;
    }

    fn done(&self) -> bool {
        self.terminal_sent && self.frame_pos >= self.frame.len()
    }
}

/// One client connection's full lifecycle: socket, optional TLS session,
/// pre-serialized requests, response parser, and the counters a run's
/// statistics are built from.
pub struct Connection {
    pub token: Token,
    template: Arc<ConnectionTemplate>,
    sibling_index: u32,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    capture_cookies: bool,

    addr: Option<SocketAddr>,
    bind_addr: Option<SocketAddr>,
    state: State,
    transport: Option<Transport>,

    prepared: PreparedRequest,
    cookies: Option<String>,
    header_cclose: bool,
    writing_started: bool,
    write_pos: usize,
    using_close: bool,
    chunk: Option<ChunkWrite>,

    parser: ResponseParser,
    ramp_start: Option<Instant>,
    delay_deadline: Option<Instant>,
    delay_rng: SmallRng,

    pub stats: ConnStats,
    pub retired: bool,
}

impl Connection {
    pub fn new(
        token: Token,
        template: Arc<ConnectionTemplate>,
        sibling_index: u32,
        tls_config: Option<Arc<rustls::ClientConfig>>,
        capture_cookies: bool,
    ) -> Self {
        let prepared = request::build(&template, sibling_index, None);
        let seed = (template.index as u64).wrapping_mul(0xD6E8_FEB8_6659_FD93) ^ sibling_index as u64;
        Connection {
            token,
            template,
            sibling_index,
            tls_config,
            capture_cookies,
            addr: None,
            bind_addr: None,
            state: State::Idle,
            transport: None,
            prepared,
            cookies: None,
            header_cclose: false,
            writing_started: false,
            write_pos: 0,
            using_close: false,
            chunk: None,
            parser: ResponseParser::new(),
            ramp_start: None,
            delay_deadline: None,
            delay_rng: SmallRng::seed_from_u64(seed),
            stats: ConnStats::default(),
            retired: false,
        }
    }

    /// Kicks off the connection's lifecycle: either an immediate connect, or
    /// (when a per-connection ramp-up is configured) a stretched initial
    /// delay before the first connect attempt.
    pub fn start(&mut self, poll: &Poll, errors: &ErrorCounters) {
        let now = Instant::now();
        self.ramp_start = Some(now);
        if self.template.ramp_up_ms > 0 {
            let delay = scheduler::ramp_scaled_delay_ms(
                &mut self.delay_rng,
                self.template.delay_min_ms,
                self.template.delay_max_ms,
                self.template.ramp_up_ms,
                0,
            );
            self.delay_deadline = Some(now + std::time::Duration::from_millis(delay));
            self.state = State::Delaying;
        } else {
            self.connect(poll, errors);
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Called by the worker loop once per watchdog tick; fires the delay
    /// timer if it has elapsed.
    pub fn tick(&mut self, poll: &Poll, errors: &ErrorCounters) {
        if self.state != State::Delaying {
            return;
        }
        let Some(deadline) = self.delay_deadline else { return };
        if Instant::now() < deadline {
            return;
        }
        self.delay_deadline = None;
        if self.transport.is_none() {
            self.connect(poll, errors);
        } else {
            self.state = State::Writing;
            let _ = self.reregister(poll, Interest::WRITABLE);
            self.do_write(poll, errors);
        }
    }

    pub fn on_writable(&mut self, poll: &Poll, errors: &ErrorCounters, shutdown: &Shutdown) {
        match self.state {
            State::Connecting => self.finish_connect(poll, errors),
            State::Handshaking => self.drive_handshake(poll, errors),
            State::Writing => self.do_write(poll, errors),
            _ => {}
        }
        let _ = shutdown;
    }

    pub fn on_readable(&mut self, poll: &Poll, errors: &ErrorCounters, shutdown: &Shutdown) {
        match self.state {
            State::Handshaking => self.drive_handshake(poll, errors),
            State::Reading => self.do_read(poll, errors, shutdown),
            _ => {}
        }
    }

    fn reregister(&mut self, poll: &Poll, interest: Interest) -> io::Result<()> {
        let token = self.token;
        poll.registry()
            .reregister(self.transport.as_mut().unwrap().socket_mut(), token, interest)
    }

    fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.addr {
            return Ok(addr);
        }
        let addr = net::dns::resolve(&self.template.host, self.template.port)?;
        self.addr = Some(addr);
        Ok(addr)
    }

    fn connect(&mut self, poll: &Poll, errors: &ErrorCounters) {
        if self.stats.start.is_none() {
            self.stats.start = Some(Instant::now());
        }
        if let Err(e) = self.try_connect(poll) {
            tracing::debug!(token = ?self.token, error = %e, "connect failed");
            errors.conn();
            self.schedule_retry();
        }
    }

    fn try_connect(&mut self, poll: &Poll) -> io::Result<()> {
        let addr = self
            .resolve_addr()
            .map_err(io::Error::other)?;
        if self.bind_addr.is_none() {
            if let Some(host_from) = &self.template.host_from {
                let bind = net::dns::resolve(host_from, 0).map_err(io::Error::other)?;
                self.bind_addr = Some(bind);
            }
        }
        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        if let Some(bind) = self.bind_addr {
            socket.bind(&bind.into())?;
        }
        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            // A nonblocking connect reports EINPROGRESS while it's pending;
            // std doesn't expose a stable ErrorKind for it yet, so match the
            // raw errno (EINPROGRESS = 115 on Linux, 36 on BSD/macOS).
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(e) => return Err(e),
        }
        let std_stream: std::net::TcpStream = socket.into();
        net::keepalive::apply(&std_stream, &self.template.tcp_keep_alive, &self.template.close);
        let mut mio_stream = mio::net::TcpStream::from_std(std_stream);
        poll.registry()
            .register(&mut mio_stream, self.token, Interest::WRITABLE)?;
        self.transport = Some(Transport::Plain(mio_stream));
        self.state = State::Connecting;
        Ok(())
    }

    fn schedule_retry(&mut self) {
        self.transport = None;
        let delay = scheduler::jitter_ms(
            &mut self.delay_rng,
            self.template.delay_min_ms,
            self.template.delay_max_ms,
        )
        .max(50);
        self.delay_deadline = Some(Instant::now() + std::time::Duration::from_millis(delay));
        self.state = State::Delaying;
    }

    fn finish_connect(&mut self, poll: &Poll, errors: &ErrorCounters) {
        match self.transport.as_ref().unwrap().take_connect_error() {
            Ok(None) => {}
            Ok(Some(e)) | Err(e) => {
                tracing::debug!(token = ?self.token, error = %e, "connect reported error");
                errors.conn();
                self.schedule_retry();
                return;
            }
        }
        if self.stats.first_writable.is_none() {
            self.stats.first_writable = Some(Instant::now());
        }
        self.stats.connections += 1;
        if self.template.scheme == Scheme::Https {
            let config = self.tls_config.clone().expect("https template without tls config");
            let host = self.template.host.clone();
            let transport = self.transport.take().unwrap();
            let Transport::Plain(socket) = transport else { unreachable!() };
            match net::tls::new_connection(config, &host) {
                Ok(conn) => {
                    self.transport = Some(Transport::Tls(Box::new(TlsStream { socket, conn })));
                    self.state = State::Handshaking;
                    self.drive_handshake(poll, errors);
                }
                Err(e) => {
                    tracing::debug!(token = ?self.token, error = %e, "tls session init failed");
                    errors.conn();
                    self.schedule_retry();
                }
            }
        } else {
            self.state = State::Writing;
            self.do_write(poll, errors);
        }
    }

    fn drive_handshake(&mut self, poll: &Poll, errors: &ErrorCounters) {
        let result = self.transport.as_mut().unwrap().tls_tick();
        if let Err(e) = result {
            tracing::debug!(token = ?self.token, error = %e, "tls handshake failed");
            errors.conn();
            self.schedule_retry();
            return;
        }
        if self.transport.as_ref().unwrap().is_handshaking() {
            if let Some(interest) = self.transport.as_ref().unwrap().tls_interest() {
                let _ = self.reregister(poll, interest);
            }
            return;
        }
        self.stats.handshake = Some(Instant::now());
        self.state = State::Writing;
        let _ = self.reregister(poll, Interest::WRITABLE);
        self.do_write(poll, errors);
    }

    fn begin_request(&mut self) {
        if self.cookies.as_deref().map(str::len).unwrap_or(0) > 0 {
            self.prepared = request::build(&self.template, self.sibling_index, self.cookies.as_deref());
        }
        let reqs_total_next = self.stats.reqs_total + 1;
        let reqs_next = self.stats.reqs + 1;
        self.using_close = self.template.close.client
            || (self.template.reqs_max > 0 && reqs_total_next == self.template.reqs_max)
            || (self.template.keep_alive_reqs > 0 && reqs_next == self.template.keep_alive_reqs);
        self.header_cclose = self.using_close;
        self.write_pos = 0;
        self.chunk = match &self.prepared.body {
            RequestBody::Random { total_size, .. } => Some(ChunkWrite::new(*total_size)),
            _ => None,
        };
        self.writing_started = true;
    }

    fn do_write(&mut self, poll: &Poll, errors: &ErrorCounters) {
        if !self.writing_started {
            self.begin_request();
        }
        loop {
            let header = if self.using_close { &self.prepared.close } else { &self.prepared.keep_alive };
            if self.write_pos < header.len() {
                let remaining = &header[self.write_pos..];
                match self.transport.as_mut().unwrap().write(remaining) {
                    Ok(n) => {
                        self.write_pos += n;
                        self.stats.written_total += n as u64;
                        continue;
                    }
                    Err(e) if would_block(&e) => {
                        let _ = self.reregister(poll, Interest::WRITABLE);
                        return;
                    }
                    Err(e) => {
                        self.on_io_error(errors, e);
                        return;
                    }
                }
            }

            // `raw` is an `Arc<[u8]>`; this clones the handle (a refcount
            // bump), never the up-to-64-MiB buffer it points at.
            let raw = match &self.prepared.body {
                RequestBody::Random { raw, .. } => Some(raw.clone()),
                _ => None,
            };
            if let (Some(chunk), Some(raw)) = (self.chunk.as_mut(), raw.as_ref()) {
                if chunk.frame.is_empty() || chunk.frame_pos >= chunk.frame.len() {
                    if chunk.done() {
                        break;
                    }
                    chunk.fill_next_frame(raw);
                }
                let remaining = &chunk.frame[chunk.frame_pos..];
                match self.transport.as_mut().unwrap().write(remaining) {
                    Ok(n) => {
                        chunk.frame_pos += n;
                        self.stats.written_total += n as u64;
                        continue;
                    }
                    Err(e) if would_block(&e) => {
                        let _ = self.reregister(poll, Interest::WRITABLE);
                        return;
                    }
                    Err(e) => {
                        self.on_io_error(errors, e);
                        return;
                    }
                }
            }

            break;
        }

        // Full request accepted by the kernel.
        if self.stats.established.is_none() {
            self.stats.established = Some(Instant::now());
        }
        self.stats.reqs += 1;
        self.stats.reqs_total += 1;
        self.writing_started = false;
        self.parser = ResponseParser::new();
        self.state = State::Reading;
        let _ = self.reregister(poll, Interest::READABLE);
    }

    fn do_read(&mut self, poll: &Poll, errors: &ErrorCounters, shutdown: &Shutdown) {
        let mut buf = [0u8; crate::prelude::RECV_BUF_SIZE];
        loop {
            match self.transport.as_mut().unwrap().read(&mut buf) {
                Ok(0) => {
                    let completed = self.parser.note_eof();
                    if completed {
                        self.on_response_complete(poll, errors, shutdown);
                    } else {
                        self.on_io_error(errors, io::Error::new(ErrorKind::UnexpectedEof, "peer closed early"));
                    }
                    return;
                }
                Ok(n) => {
                    self.stats.read_total += n as u64;
                    match self.parser.feed(&buf[..n], self.capture_cookies) {
                        Ok(true) => {
                            self.on_response_complete(poll, errors, shutdown);
                            return;
                        }
                        Ok(false) => continue,
                        Err(e) => {
                            errors.parser();
                            tracing::debug!(token = ?self.token, error = %e, "response parse error");
                            self.close_and_reconnect(poll);
                            return;
                        }
                    }
                }
                Err(e) if would_block(&e) => return,
                Err(e) => {
                    self.on_io_error(errors, e);
                    return;
                }
            }
        }
    }

    fn on_response_complete(&mut self, poll: &Poll, errors: &ErrorCounters, shutdown: &Shutdown) {
        if !self.capture_cookies {
            // nothing to fold in
        } else if let Some(latest) = self.parser.cookies.last() {
            self.cookies = Some(latest.clone());
        }

        match classify_status(self.parser.status) {
            Some(StatusOutcome::Status) => errors.status(),
            Some(StatusOutcome::Parser) => errors.parser(),
            None => {}
        }

        if self.template.reqs_max > 0 && self.stats.reqs_total == self.template.reqs_max {
            self.retire(poll, shutdown);
            return;
        }

        let server_wants_close = self.parser.server_wants_close;
        let keep_alive_exhausted =
            self.template.keep_alive_reqs > 0 && self.stats.reqs == self.template.keep_alive_reqs;

        if self.header_cclose || server_wants_close || keep_alive_exhausted {
            self.close_and_reconnect(poll);
        } else {
            self.schedule_next_request(poll);
        }
    }

    fn schedule_next_request(&mut self, poll: &Poll) {
        let elapsed = self
            .ramp_start
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(u64::MAX);
        let delay = scheduler::ramp_scaled_delay_ms(
            &mut self.delay_rng,
            self.template.delay_min_ms,
            self.template.delay_max_ms,
            self.template.ramp_up_ms,
            elapsed,
        );
        if delay == 0 {
            self.state = State::Writing;
            // do_write is invoked by the worker on the next tick via tick(),
            // to keep dispatches bounded; mark the deadline as already due.
        }
        self.delay_deadline = Some(Instant::now() + std::time::Duration::from_millis(delay));
        self.state = State::Delaying;
        let _ = poll;
    }

    fn close_and_reconnect(&mut self, poll: &Poll) {
        if let Some(mut transport) = self.transport.take() {
            let _ = poll.registry().deregister(transport.socket_mut());
        }
        self.stats.reqs = 0;
        if !self.capture_cookies {
            self.cookies = None;
        }
        self.state = State::Idle;
        self.schedule_next_request(poll);
    }

    fn retire(&mut self, poll: &Poll, shutdown: &Shutdown) {
        if let Some(mut transport) = self.transport.take() {
            let _ = poll.registry().deregister(transport.socket_mut());
        }
        self.state = State::Retired;
        self.retired = true;
        shutdown.connection_retired();
    }

    fn on_io_error(&mut self, errors: &ErrorCounters, e: io::Error) {
        tracing::debug!(token = ?self.token, error = %e, "connection I/O error");
        errors.conn();
        self.transport = None;
        self.state = State::Idle;
        self.schedule_retry();
    }
}

fn would_block(e: &io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
}

#[derive(Debug, PartialEq, Eq)]
enum StatusOutcome {
    Status,
    Parser,
}

/// Classifies a parsed response status per the counter rules: `>= 400` is a
/// status error, `< 100` (or no status at all, i.e. a parse failure) is a
/// parser error, anything else doesn't move either counter.
fn classify_status(status: Option<u16>) -> Option<StatusOutcome> {
    match status {
        Some(s) if s >= 400 => Some(StatusOutcome::Status),
        Some(s) if s < 100 => Some(StatusOutcome::Parser),
        None => Some(StatusOutcome::Parser),
        _ => None,
    }
}

#[cfg(test)]
mod classify_status_tests {
    use super::*;

    #[test]
    fn success_status_is_not_an_error() {
        assert_eq!(classify_status(Some(200)), None);
    }

    #[test]
    fn server_error_status_counts_as_status_error() {
        assert_eq!(classify_status(Some(500)), Some(StatusOutcome::Status));
    }

    #[test]
    fn sub_100_status_counts_as_parser_error() {
        assert_eq!(classify_status(Some(42)), Some(StatusOutcome::Parser));
    }

    #[test]
    fn missing_status_counts_as_parser_error() {
        assert_eq!(classify_status(None), Some(StatusOutcome::Parser));
    }
}
