use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Poll, Token};

use crate::connection::Connection;
use crate::error::Result;
use crate::shutdown::Shutdown;
use crate::stats::{ConnStats, ErrorCounters};
use crate::template::ExpandedConnection;

/// Runs one worker thread's disjoint slice of connections under a single
/// `mio::Poll`, stopping when the shared `run` counter reaches zero, a
/// signal is observed, or the caller's deadline passes.
pub fn run(
    worker_id: usize,
    slice: &[ExpandedConnection],
    tls_configs: &std::collections::HashMap<usize, Arc<rustls::ClientConfig>>,
    capture_cookies: bool,
    errors: Arc<ErrorCounters>,
    shutdown: Arc<Shutdown>,
) -> Result<Vec<ConnStats>> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity((slice.len() + 8).max(16));

    let mut connections: Vec<Connection> = slice
        .iter()
        .enumerate()
        .map(|(i, expanded)| {
            let tls_config = tls_configs.get(&expanded.template.index).cloned();
            tracing::trace!(
                worker_id,
                token = i,
                duplicate = expanded.duplicate,
                "spawning connection"
            );
            Connection::new(
                Token(i),
                expanded.template.clone(),
                expanded.sibling_index,
                tls_config,
                capture_cookies,
            )
        })
        .collect();

    if connections.is_empty() {
        tracing::warn!(worker_id, "worker assigned zero connections, exiting");
        return Ok(Vec::new());
    }

    for conn in connections.iter_mut() {
        conn.start(&poll, &errors);
    }

    let watchdog = Duration::from_millis(crate::prelude::WATCHDOG_MS);
    while !shutdown.is_stopped() {
        poll.poll(&mut events, Some(watchdog))?;
        for event in events.iter() {
            let Token(idx) = event.token();
            let Some(conn) = connections.get_mut(idx) else { continue };
            if conn.is_retired() {
                continue;
            }
            if event.is_writable() {
                conn.on_writable(&poll, &errors, &shutdown);
            }
            if event.is_readable() {
                conn.on_readable(&poll, &errors, &shutdown);
            }
        }
        for conn in connections.iter_mut() {
            if !conn.is_retired() {
                conn.tick(&poll, &errors);
            }
        }
    }

    Ok(connections.into_iter().map(|c| c.stats).collect())
}
