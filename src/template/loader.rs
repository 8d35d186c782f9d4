use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::LoadError;

use super::types::{ConnectionTemplate, ExpandedConnection};
use super::validate::validate_and_build;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawTemplate {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub host_from: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<RawBody>,
    #[serde(default)]
    pub tcp: Option<RawTcp>,
    #[serde(default)]
    pub delay: Option<RawDelay>,
    #[serde(default)]
    pub close: Option<RawClose>,
    #[serde(rename = "max-requests", default)]
    pub max_requests: Option<u64>,
    #[serde(rename = "keep-alive-requests", default)]
    pub keep_alive_requests: Option<u64>,
    #[serde(rename = "tls-session-reuse", default)]
    pub tls_session_reuse: Option<bool>,
    #[serde(default)]
    pub clients: Option<u32>,
    #[serde(rename = "ramp-up", default)]
    pub ramp_up: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(super) enum RawBody {
    /// Deprecated: a bare string used to mean `body.content`.
    Legacy(String),
    Object {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        size: Option<usize>,
        #[serde(rename = "type", default)]
        kind: Option<String>,
    },
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct RawTcp {
    #[serde(rename = "keep-alive", default)]
    pub keep_alive: Option<RawKeepAlive>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct RawKeepAlive {
    #[serde(default)]
    pub enable: Option<bool>,
    #[serde(default)]
    pub idle: Option<u32>,
    #[serde(default)]
    pub intvl: Option<u32>,
    #[serde(default)]
    pub cnt: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct RawDelay {
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct RawClose {
    #[serde(default)]
    pub client: Option<bool>,
    /// Linger seconds, matching the original's wire format: the key's
    /// integer value *is* the linger time, and its mere presence is what
    /// turns lingering on.
    #[serde(default)]
    pub linger: Option<u32>,
}

/// Parses a request-template JSON file into the expanded, per-connection
/// array `clients: N` produces. Any parse or validation error is fatal and
/// names the offending template by its array index.
pub fn load_file(path: &Path) -> Result<Vec<ExpandedConnection>, LoadError> {
    let content = fs::read_to_string(path)
        .map_err(|e| LoadError::Io(format!("{}: {e}", path.display())))?;
    load_str(&content)
}

pub fn load_str(content: &str) -> Result<Vec<ExpandedConnection>, LoadError> {
    let raw: Vec<RawTemplate> =
        serde_json::from_str(content).map_err(|e| LoadError::Json(e.to_string()))?;

    let mut expanded = Vec::new();
    for (idx, item) in raw.into_iter().enumerate() {
        let template = validate_and_build(idx, item)?;
        expand_into(template, &mut expanded);
    }
    Ok(expanded)
}

fn expand_into(template: ConnectionTemplate, out: &mut Vec<ExpandedConnection>) {
    let clients = template.clients;
    let template = std::sync::Arc::new(template);
    for sibling_index in 0..clients {
        out.push(ExpandedConnection {
            template: template.clone(),
            sibling_index,
            duplicate: sibling_index != 0,
        });
    }
}
