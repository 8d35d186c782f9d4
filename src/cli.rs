use std::path::PathBuf;

use clap::Parser;

use crate::error::LoadError;

#[derive(Parser, Debug)]
#[command(name = "reqstorm", version, about = "HTTP/1.1 load generator driven by a JSON request-template file")]
pub struct Cli {
    /// Capture and echo Set-Cookie values; enables response header parsing.
    #[arg(short = 'c', long)]
    pub cookies: bool,

    /// Global test duration in seconds, including ramp-up.
    #[arg(short = 'd', long, value_name = "SECONDS")]
    pub duration: u64,

    /// Path to the JSON request-template array.
    #[arg(short = 'i', long = "request-file", value_name = "PATH")]
    pub request_file: PathBuf,

    /// Optional output file for the statistics report; default is stdout.
    #[arg(short = 'o', long = "response-file", value_name = "PATH")]
    pub response_file: Option<PathBuf>,

    /// Suppress info-level diagnostics.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Thread-staggering ramp-up, in seconds.
    #[arg(short = 'r', long = "ramp-up", value_name = "SECONDS", default_value_t = 0)]
    pub ramp_up: u64,

    /// TLS protocol selection: 0=auto, 1=SSLv3, 2=TLS1.0, 3=TLS1.1, 4=TLS1.2.
    #[arg(short = 's', long = "ssl-version", value_name = "0..4", default_value_t = 0)]
    pub ssl_version: u8,

    /// Worker thread count; defaults to the online CPU count.
    #[arg(short = 't', long, value_name = "N")]
    pub threads: Option<usize>,
}

impl Cli {
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.duration == 0 {
            return Err(LoadError::Validation {
                path: "--duration".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.ramp_up >= self.duration {
            return Err(LoadError::Validation {
                path: "--ramp-up".to_string(),
                reason: format!("must be less than --duration ({})", self.duration),
            });
        }
        if self.ssl_version > 4 {
            return Err(LoadError::InvalidValue {
                path: "--ssl-version".to_string(),
                reason: "must be in 0..4".to_string(),
            });
        }
        if let Some(threads) = self.threads {
            if threads == 0 {
                return Err(LoadError::Validation {
                    path: "--threads".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}
