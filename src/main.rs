mod cli;
mod connection;
mod error;
mod http;
mod net;
mod prelude;
mod request;
mod rng;
mod scheduler;
mod shutdown;
mod stats;
mod template;
mod worker;

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use error::Result;
use shutdown::Shutdown;
use stats::{ErrorCounters, Report};
use template::ExpandedConnection;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    if let Err(e) = cli.validate() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: &Cli) -> Result<i32> {
    let nameservers = net::dns::configured_nameservers();
    if !nameservers.is_empty() {
        tracing::info!(?nameservers, "using NAMESERVER<n> overrides for logging only; resolution still uses the OS resolver");
    }

    let connections = template::load_file(&cli.request_file)?;
    if connections.is_empty() {
        tracing::warn!("request file produced zero connections");
    }

    let threads = cli
        .threads
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
        .max(1);

    let tls_configs = build_tls_configs(&connections, cli.ssl_version)?;

    let shutdown = Arc::new(Shutdown::new(connections.len()));
    shutdown.install_signal_handlers()?;
    let errors = ErrorCounters::shared();

    let slices = partition(&connections, threads);
    let stagger = scheduler::thread_stagger(threads, cli.ramp_up * 1000);

    let run_started = Instant::now();
    let duration = Duration::from_secs(cli.duration);

    let mut handles = Vec::with_capacity(threads);
    for (worker_id, slice) in slices.into_iter().enumerate() {
        if worker_id > 0 && !stagger.is_zero() {
            std::thread::sleep(stagger);
        }
        let slice = slice.to_vec();
        let tls_configs = tls_configs.clone();
        let errors = errors.clone();
        let shutdown = shutdown.clone();
        let capture_cookies = cli.cookies;
        handles.push(std::thread::spawn(move || {
            worker::run(worker_id, &slice, &tls_configs, capture_cookies, errors, shutdown)
        }));
    }

    while run_started.elapsed() < duration && !shutdown.is_stopped() {
        let remaining = duration.saturating_sub(run_started.elapsed());
        std::thread::sleep(remaining.min(Duration::from_millis(prelude::WATCHDOG_MS)));
    }
    shutdown.force_stop();

    let mut per_conn = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(Ok(stats)) => per_conn.extend(stats),
            Ok(Err(e)) => tracing::error!(error = %e, "worker failed"),
            Err(_) => tracing::error!("worker thread panicked"),
        }
    }

    let report = Report::aggregate(&per_conn, &errors, run_started.elapsed());
    write_report(cli, &report)?;

    Ok(0)
}

fn write_report(cli: &Cli, report: &Report) -> Result<()> {
    let text = report.render();
    match &cli.response_file {
        Some(path) => {
            let mut f = std::fs::File::create(path)?;
            f.write_all(text.as_bytes())?;
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn build_tls_configs(
    connections: &[ExpandedConnection],
    ssl_version: u8,
) -> Result<HashMap<usize, Arc<rustls::ClientConfig>>> {
    if matches!(ssl_version, 1..=3) {
        let names = ["", "SSLv3", "TLS1.0", "TLS1.1"];
        if connections.iter().any(|c| c.template.scheme == template::Scheme::Https) {
            return Err(error::LoadError::InvalidValue {
                path: "--ssl-version".to_string(),
                reason: format!("{} is not supported by this crate's TLS backend", names[ssl_version as usize]),
            }
            .into());
        }
    }

    let mut configs = HashMap::new();
    for conn in connections {
        if conn.template.scheme != template::Scheme::Https {
            continue;
        }
        configs
            .entry(conn.template.index)
            .or_insert_with(|| net::tls::build_config(conn.template.tls_session_reuse));
    }
    Ok(configs)
}

/// Splits `connections` into `threads` contiguous, near-equal slices:
/// worker `i` owns `[floor(i*C/T), floor((i+1)*C/T))`.
fn partition(connections: &[ExpandedConnection], threads: usize) -> Vec<&[ExpandedConnection]> {
    let total = connections.len();
    (0..threads)
        .map(|i| {
            let start = total * i / threads;
            let end = total * (i + 1) / threads;
            &connections[start..end]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use template::{Body, ClosePolicy, ConnectionTemplate, Scheme, TcpKeepAlive};

    fn dummy(index: usize) -> ExpandedConnection {
        ExpandedConnection {
            template: Arc::new(ConnectionTemplate {
                index,
                host: "h".into(),
                port: 80,
                host_from: None,
                scheme: Scheme::Http,
                method: "GET".into(),
                path: "/".into(),
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
            }),
            sibling_index: 0,
            duplicate: false,
        }
    }

    #[test]
    fn partitions_cover_every_connection_exactly_once() {
        let conns: Vec<_> = (0..10).map(dummy).collect();
        let slices = partition(&conns, 3);
        let total: usize = slices.iter().map(|s| s.len()).sum();
        assert_eq!(total, 10);
        assert_eq!(slices.len(), 3);
    }

    #[test]
    fn more_threads_than_connections_yields_empty_slices() {
        let conns: Vec<_> = (0..2).map(dummy).collect();
        let slices = partition(&conns, 5);
        assert_eq!(slices.iter().filter(|s| s.is_empty()).count(), 3);
    }
}
