use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::error::Result;

/// The run counter from the shutdown design: initialized to the number of
/// connections, decremented as each one retires, and forced to zero by
/// duration expiry or a termination signal. Every worker watchdog tick
/// samples it; reaching zero stops every worker within one tick.
pub struct Shutdown {
    run: AtomicI64,
    signaled: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new(connection_count: usize) -> Self {
        Shutdown {
            run: AtomicI64::new(connection_count as i64),
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers SIGINT/SIGTERM handlers that flip a flag observed by
    /// `is_stopped`; the signal handler itself does no unsafe work beyond
    /// what `signal-hook` already guarantees is async-signal-safe.
    pub fn install_signal_handlers(&self) -> Result<()> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, self.signaled.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, self.signaled.clone())?;
        Ok(())
    }

    /// Called by a connection that reaches `reqs_max` and retires.
    pub fn connection_retired(&self) {
        self.run.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn force_stop(&self) {
        self.run.store(0, Ordering::SeqCst);
    }

    pub fn signal_received(&self) -> bool {
        self.signaled.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.run.load(Ordering::SeqCst) <= 0 || self.signal_received()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaching_zero_stops() {
        let s = Shutdown::new(2);
        assert!(!s.is_stopped());
        s.connection_retired();
        assert!(!s.is_stopped());
        s.connection_retired();
        assert!(s.is_stopped());
    }

    #[test]
    fn force_stop_overrides_outstanding_count() {
        let s = Shutdown::new(100);
        s.force_stop();
        assert!(s.is_stopped());
    }
}
