use std::io::{self, Read, Write};

use mio::Interest;
use mio::net::TcpStream;
use rustls::ClientConnection;

/// A connection's socket, plain or behind TLS. Both variants expose the
/// same `Read`/`Write`-shaped interface the state machine drives, with the
/// TLS side layering `read_tls`/`write_tls`/`process_new_packets` and
/// surfacing the plaintext through `ClientConnection`'s own `Reader`/`Writer`.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream>),
}

pub struct TlsStream {
    pub socket: TcpStream,
    pub conn: ClientConnection,
}

impl Transport {
    pub fn socket_mut(&mut self) -> &mut TcpStream {
        match self {
            Transport::Plain(s) => s,
            Transport::Tls(t) => &mut t.socket,
        }
    }

    /// Surfaces a pending `SO_ERROR` from a just-completed nonblocking
    /// connect attempt.
    pub fn take_connect_error(&self) -> io::Result<Option<io::Error>> {
        match self {
            Transport::Plain(s) => s.take_error(),
            Transport::Tls(t) => t.socket.take_error(),
        }
    }

    pub fn is_handshaking(&self) -> bool {
        match self {
            Transport::Plain(_) => false,
            Transport::Tls(t) => t.conn.is_handshaking(),
        }
    }

    /// Drives pending TLS I/O: flushes any ciphertext rustls wants to send
    /// and pulls in anything available to decrypt. A no-op on a plain
    /// transport.
    pub fn tls_tick(&mut self) -> io::Result<()> {
        let Transport::Tls(t) = self else { return Ok(()) };
        if t.conn.wants_write() {
            t.conn.write_tls(&mut t.socket)?;
        }
        if t.conn.wants_read() {
            match t.conn.read_tls(&mut t.socket) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "tls peer closed")),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
            t.conn
                .process_new_packets()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
        Ok(())
    }

    /// The `Interest` the event loop should register for, given what rustls
    /// currently wants (meaningless for a plain transport mid-request, where
    /// the caller tracks its own direction explicitly).
    pub fn tls_interest(&self) -> Option<Interest> {
        let Transport::Tls(t) = self else { return None };
        match (t.conn.wants_read(), t.conn.wants_write()) {
            (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.write(buf),
            Transport::Tls(t) => {
                let n = t.conn.writer().write(buf)?;
                t.conn.write_tls(&mut t.socket)?;
                Ok(n)
            }
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.read(buf),
            Transport::Tls(t) => {
                match t.conn.read_tls(&mut t.socket) {
                    Ok(0) => return Ok(0),
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e),
                }
                t.conn
                    .process_new_packets()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                t.conn.reader().read(buf)
            }
        }
    }
}
