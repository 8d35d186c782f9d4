//! End-to-end scenarios driven against the compiled binary and a tiny
//! loopback HTTP/1.1 server, mirroring the scenarios named in this crate's
//! design notes (minimal GET, chunked random body, keep-alive ceiling,
//! clients expansion).

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn run_cli(json: &str, extra_args: &[&str]) -> (String, u64) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicU64::new(0));
    let hits_server = hits.clone();

    let server = std::thread::spawn(move || {
        listener.set_nonblocking(false).unwrap();
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let hits = hits_server.clone();
            std::thread::spawn(move || serve_connection(stream, &hits));
        }
    });

    let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    std::fs::write(file.path(), json.replace("$PORT", &port.to_string())).unwrap();

    let mut args = vec!["-i", file.path().to_str().unwrap(), "-q"];
    args.extend_from_slice(extra_args);
    let output = Command::new(env!("CARGO_BIN_EXE_reqstorm"))
        .args(&args)
        .output()
        .expect("failed to run reqstorm binary");

    drop(server); // listener thread exits once the process below stops connecting

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert!(output.status.success(), "reqstorm exited nonzero: {stdout}\n{}", String::from_utf8_lossy(&output.stderr));
    (stdout, hits.load(Ordering::SeqCst))
}

/// A minimal HTTP/1.1 server loop: reads one request (handling both
/// `Content-Length` and chunked bodies), replies `200 OK` with an empty
/// body, and keeps the socket open unless the client asked to close.
fn serve_connection(stream: TcpStream, hits: &AtomicU64) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
            return;
        }
        let mut content_length: Option<usize> = None;
        let mut chunked = false;
        let mut client_wants_close = false;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            if line == "\r\n" {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if lower.starts_with("content-length:") {
                content_length = line.split(':').nth(1).and_then(|v| v.trim().parse().ok());
            } else if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
                chunked = true;
            } else if lower.starts_with("connection:") && lower.contains("close") {
                client_wants_close = true;
            }
        }

        if chunked {
            loop {
                let mut size_line = String::new();
                if reader.read_line(&mut size_line).unwrap_or(0) == 0 {
                    return;
                }
                let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
                if size == 0 {
                    let mut trailer = String::new();
                    let _ = reader.read_line(&mut trailer);
                    break;
                }
                let mut body = vec![0u8; size + 2];
                if reader.read_exact(&mut body).is_err() {
                    return;
                }
            }
        } else if let Some(len) = content_length {
            let mut body = vec![0u8; len];
            if len > 0 && reader.read_exact(&mut body).is_err() {
                return;
            }
        }

        hits.fetch_add(1, Ordering::SeqCst);
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
        if writer.write_all(resp).is_err() {
            return;
        }
        if client_wants_close {
            return;
        }
    }
}

fn parse_hits_line(report: &str) -> u64 {
    report
        .lines()
        .find(|l| l.starts_with("Hits:"))
        .and_then(|l| l.split([':', ',']).nth(1))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_else(|| panic!("no Hits line in report: {report}"))
}

/// S1 — minimal GET, 10 requests, single thread.
#[test]
fn minimal_get_reaches_request_ceiling() {
    let json = r#"[{ "host": "127.0.0.1", "port": $PORT, "method": "GET", "path": "/", "max-requests": 10 }]"#;
    let (report, server_hits) = run_cli(json, &["-d", "5", "-t", "1"]);
    assert_eq!(parse_hits_line(&report), 10);
    assert_eq!(server_hits, 10);
    assert!(!report.contains("Errors"));
}

/// S2 — chunked random body of exactly 1 MiB, one request.
#[test]
fn chunked_random_body_is_fully_streamed() {
    let json = r#"[{ "host": "127.0.0.1", "port": $PORT, "method": "POST", "path": "/upload",
                      "body": { "size": 1048576, "type": "random" }, "max-requests": 1 }]"#;
    let (report, server_hits) = run_cli(json, &["-d", "5", "-t", "1"]);
    assert_eq!(parse_hits_line(&report), 1);
    assert_eq!(server_hits, 1);
}

/// S3 — keep-alive ceiling of 3 requests per TCP connection, 9 total.
#[test]
fn keep_alive_ceiling_forces_reconnects() {
    let json = r#"[{ "host": "127.0.0.1", "port": $PORT, "keep-alive-requests": 3, "max-requests": 9 }]"#;
    let (report, server_hits) = run_cli(json, &["-d", "5", "-t", "1"]);
    assert_eq!(parse_hits_line(&report), 9);
    assert_eq!(server_hits, 9);
}

/// S4 — `clients: 4` expansion, each sibling reaching its own ceiling.
#[test]
fn clients_expansion_multiplies_total_hits() {
    let json = r#"[{ "host": "127.0.0.1", "port": $PORT, "clients": 4, "max-requests": 2 }]"#;
    let (report, server_hits) = run_cli(json, &["-d", "5", "-t", "1"]);
    assert_eq!(parse_hits_line(&report), 8);
    assert_eq!(server_hits, 8);
}

/// Shuts down early once every connection retires, well before the global
/// duration elapses (the "run == 0" shutdown trigger, not the timer one).
#[test]
fn run_completes_before_duration_when_all_connections_retire() {
    let json = r#"[{ "host": "127.0.0.1", "port": $PORT, "max-requests": 1 }]"#;
    let started = std::time::Instant::now();
    let (report, _) = run_cli(json, &["-d", "30", "-t", "1"]);
    assert_eq!(parse_hits_line(&report), 1);
    assert!(started.elapsed() < Duration::from_secs(10), "shutdown did not short-circuit the full duration");
}
