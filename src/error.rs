use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

/// A fatal, user-facing error. Wraps any concrete cause behind a single
/// boxed trait object so startup and runtime failures can share one
/// `Result` alias all the way up to `main`.
pub struct CleanError(pub Box<dyn Error + Send + Sync>);

impl Debug for CleanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for CleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for CleanError {}

/// Fatal error raised while loading and validating a request-template file.
/// Carries the JSON key path of the offending field so the diagnostic names
/// exactly what was wrong, per the loader's contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Io(String),
    Json(String),
    MissingKey { path: String, key: &'static str },
    InvalidValue { path: String, reason: String },
    Validation { path: String, reason: String },
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(msg) => write!(f, "failed to read request file: {msg}"),
            LoadError::Json(msg) => write!(f, "malformed JSON: {msg}"),
            LoadError::MissingKey { path, key } => {
                write!(f, "{path}: missing required key \"{key}\"")
            }
            LoadError::InvalidValue { path, reason } => write!(f, "{path}: {reason}"),
            LoadError::Validation { path, reason } => write!(f, "{path}: {reason}"),
        }
    }
}

impl Error for LoadError {}

impl From<LoadError> for CleanError {
    fn from(e: LoadError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::io::Error> for CleanError {
    fn from(e: std::io::Error) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for CleanError {
    fn from(e: std::net::AddrParseError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<String> for CleanError {
    fn from(s: String) -> Self {
        CleanError(Box::new(LoadError::Validation {
            path: String::new(),
            reason: s,
        }))
    }
}

impl From<&str> for CleanError {
    fn from(s: &str) -> Self {
        CleanError::from(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;
