use crate::error::LoadError;

use super::loader::{RawBody, RawTemplate};
use super::types::{Body, ClosePolicy, ConnectionTemplate, Scheme, TcpKeepAlive};

pub(super) fn validate_and_build(
    idx: usize,
    raw: RawTemplate,
) -> Result<ConnectionTemplate, LoadError> {
    let path = format!("templates[{idx}]");

    if raw.host.is_empty() {
        return Err(LoadError::MissingKey {
            path,
            key: "host",
        });
    }

    let scheme = match raw.scheme.as_deref() {
        None | Some("http") => Scheme::Http,
        Some("https") => Scheme::Https,
        Some(other) => {
            return Err(LoadError::InvalidValue {
                path,
                reason: format!("scheme must be \"http\" or \"https\", got \"{other}\""),
            });
        }
    };

    let clients = raw.clients.unwrap_or(1);
    if clients == 0 || clients > crate::prelude::MAX_CLIENTS {
        return Err(LoadError::InvalidValue {
            path,
            reason: format!("clients must be in 1..={}, got {clients}", crate::prelude::MAX_CLIENTS),
        });
    }

    let delay = raw.delay.unwrap_or_default();
    let delay_min_ms = delay.min.unwrap_or(0);
    let delay_max_ms = delay.max.unwrap_or(delay_min_ms);
    if delay_min_ms > delay_max_ms {
        return Err(LoadError::InvalidValue {
            path,
            reason: format!(
                "delay.min ({delay_min_ms}) must be <= delay.max ({delay_max_ms})"
            ),
        });
    }

    let reqs_max = raw.max_requests.unwrap_or(0);
    let keep_alive_reqs = raw.keep_alive_requests.unwrap_or(0);

    let body = build_body(&path, raw.body)?;

    let tcp = raw.tcp.unwrap_or_default();
    let keep_alive = tcp.keep_alive.unwrap_or_default();
    let tcp_keep_alive = TcpKeepAlive {
        enable: keep_alive.enable.unwrap_or(false),
        idle: keep_alive.idle.unwrap_or(75),
        intvl: keep_alive.intvl.unwrap_or(15),
        cnt: keep_alive.cnt.unwrap_or(9),
    };

    let close = raw.close.unwrap_or_default();
    let close_policy = ClosePolicy {
        client: close.client.unwrap_or(false),
        linger: close.linger.is_some(),
        linger_secs: close.linger.unwrap_or(0),
    };

    Ok(ConnectionTemplate {
        index: idx,
        host: raw.host,
        port: raw.port,
        host_from: raw.host_from,
        scheme,
        method: raw.method.unwrap_or_else(|| "GET".to_string()),
        path: raw.path.unwrap_or_else(|| "/".to_string()),
        headers: raw.headers.into_iter().collect(),
        body,
        tcp_keep_alive,
        close: close_policy,
        reqs_max,
        keep_alive_reqs,
        tls_session_reuse: raw.tls_session_reuse.unwrap_or(false),
        delay_min_ms,
        delay_max_ms,
        ramp_up_ms: raw.ramp_up.unwrap_or(0),
        clients,
    })
}

fn build_body(path: &str, raw: Option<RawBody>) -> Result<Body, LoadError> {
    let raw = match raw {
        None => return Ok(Body::None),
        Some(r) => r,
    };

    match raw {
        RawBody::Legacy(content) => {
            tracing::warn!(
                "{path}: body given as a bare string is deprecated, use {{\"content\": ...}} instead"
            );
            Ok(Body::Content(content.into_bytes()))
        }
        RawBody::Object { content, size, kind } => match kind.as_deref() {
            Some("random") => {
                let size = size.unwrap_or(0);
                if size == 0 {
                    return Err(LoadError::InvalidValue {
                        path: path.to_string(),
                        reason: "body.size cannot be 0 when body.type is \"random\"".to_string(),
                    });
                }
                if content.is_some() {
                    tracing::warn!(
                        "{path}: body.content is ignored because body.type is \"random\""
                    );
                }
                Ok(Body::Random { size })
            }
            Some("content") | None => Ok(match content {
                Some(c) => Body::Content(c.into_bytes()),
                None => Body::None,
            }),
            Some(other) => Err(LoadError::InvalidValue {
                path: path.to_string(),
                reason: format!("body.type must be \"content\" or \"random\", got \"{other}\""),
            }),
        },
    }
}
