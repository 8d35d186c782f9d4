use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Per-connection counters. Written only by the owning worker thread, so no
/// synchronization is needed until the final aggregation after join.
#[derive(Debug, Default, Clone)]
pub struct ConnStats {
    pub start: Option<Instant>,
    pub first_writable: Option<Instant>,
    pub established: Option<Instant>,
    pub handshake: Option<Instant>,
    pub connections: u64,
    pub reqs: u64,
    pub reqs_total: u64,
    pub written_total: u64,
    pub read_total: u64,
}

/// Error counters shared across worker threads. Exact accuracy under races
/// is not required, but atomics make it free to get right anyway.
#[derive(Debug, Default)]
pub struct ErrorCounters {
    pub err_conn: AtomicU64,
    pub err_status: AtomicU64,
    pub err_parser: AtomicU64,
}

impl ErrorCounters {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn conn(&self) {
        self.err_conn.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status(&self) {
        self.err_status.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parser(&self) {
        self.err_parser.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Report {
    pub duration: std::time::Duration,
    pub sent: u64,
    pub recv: u64,
    pub hits: u64,
    pub err_conn: u64,
    pub err_status: u64,
    pub err_parser: u64,
}

impl Report {
    pub fn aggregate(per_conn: &[ConnStats], errors: &ErrorCounters, duration: std::time::Duration) -> Self {
        let mut sent = 0u64;
        let mut recv = 0u64;
        let mut hits = 0u64;
        for c in per_conn {
            sent += c.written_total;
            recv += c.read_total;
            hits += c.reqs_total;
        }
        Report {
            duration,
            sent,
            recv,
            hits,
            err_conn: errors.err_conn.load(Ordering::Relaxed),
            err_status: errors.err_status.load(Ordering::Relaxed),
            err_parser: errors.err_parser.load(Ordering::Relaxed),
        }
    }

    /// Renders the text report exactly in the documented format.
    pub fn render(&self) -> String {
        let secs = self.duration.as_secs_f64().max(f64::EPSILON);
        let mut out = String::new();
        let _ = writeln!(out, "Time: {:.2}s", self.duration.as_secs_f64());
        let _ = writeln!(
            out,
            "Sent: {}, {}/s",
            format_iec(self.sent as f64),
            format_iec(self.sent as f64 / secs)
        );
        let _ = writeln!(
            out,
            "Recv: {}, {}/s",
            format_iec(self.recv as f64),
            format_iec(self.recv as f64 / secs)
        );
        let _ = writeln!(out, "Hits: {}, {:.2}/s", self.hits, self.hits as f64 / secs);
        if self.err_conn != 0 || self.err_status != 0 || self.err_parser != 0 {
            let _ = writeln!(
                out,
                "Errors connection: {}, status: {}, parser: {}",
                self.err_conn, self.err_status, self.err_parser
            );
        }
        out
    }
}

const IEC_SUFFIXES: [&str; 9] = ["B", "kiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

fn format_iec(bytes: f64) -> String {
    if bytes < 1024.0 {
        return format!("{bytes:.2}B");
    }
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < IEC_SUFFIXES.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, IEC_SUFFIXES[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_small_values_in_bytes() {
        assert_eq!(format_iec(512.0), "512.00B");
    }

    #[test]
    fn formats_into_binary_suffixes() {
        assert_eq!(format_iec(1024.0), "1.00kiB");
        assert_eq!(format_iec(1024.0 * 1024.0), "1.00MiB");
    }

    #[test]
    fn report_omits_error_line_when_all_zero() {
        let errors = ErrorCounters::default();
        let report = Report::aggregate(&[], &errors, std::time::Duration::from_secs(1));
        assert!(!report.render().contains("Errors"));
    }

    #[test]
    fn report_includes_error_line_when_nonzero() {
        let errors = ErrorCounters::default();
        errors.conn();
        let report = Report::aggregate(&[], &errors, std::time::Duration::from_secs(1));
        assert!(report.render().contains("Errors connection: 1, status: 0, parser: 0"));
    }

    #[test]
    fn hits_sum_reqs_total_across_connections() {
        let conns = vec![
            ConnStats { reqs_total: 3, ..Default::default() },
            ConnStats { reqs_total: 5, ..Default::default() },
        ];
        let errors = ErrorCounters::default();
        let report = Report::aggregate(&conns, &errors, std::time::Duration::from_secs(1));
        assert_eq!(report.hits, 8);
    }
}
