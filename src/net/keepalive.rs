use std::net::TcpStream as StdTcpStream;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};

use crate::template::{ClosePolicy, TcpKeepAlive};

/// Applies the template's TCP keep-alive probe settings and linger policy
/// to a freshly-created, not-yet-connected socket. Uses `socket2` because
/// `mio::net::TcpStream` exposes neither `SO_KEEPALIVE` tuning nor
/// `SO_LINGER` directly.
pub fn apply(std_stream: &StdTcpStream, keep_alive: &TcpKeepAlive, close: &ClosePolicy) {
    let sock = SockRef::from(std_stream);

    if keep_alive.enable {
        let params = TcpKeepalive::new()
            .with_time(Duration::from_secs(keep_alive.idle as u64))
            .with_interval(Duration::from_secs(keep_alive.intvl as u64));
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let params = params.with_retries(keep_alive.cnt);
        let _ = sock.set_tcp_keepalive(&params);
    }

    if close.linger {
        let _ = sock.set_linger(Some(Duration::from_secs(close.linger_secs as u64)));
    }
}
