use std::sync::{Arc, OnceLock};

use rustls::client::Resumption;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};

use crate::error::LoadError;

fn root_store() -> &'static RootCertStore {
    static ROOTS: OnceLock<RootCertStore> = OnceLock::new();
    ROOTS.get_or_init(|| {
        let mut store = RootCertStore::empty();
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        store
    })
}

/// Builds a client TLS config for one connection template. `session_reuse`
/// mirrors the template's `tls-session-reuse` flag: enabling it turns on an
/// in-memory session cache so reconnects on the same template can resume
/// instead of doing a full handshake.
pub fn build_config(session_reuse: bool) -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store().clone())
        .with_no_client_auth();
    config.resumption = if session_reuse {
        Resumption::in_memory_sessions(256)
    } else {
        Resumption::disabled()
    };
    Arc::new(config)
}

/// Starts a new TLS client session for `host` against `config`. The
/// returned `ClientConnection` is driven nonblocking by the connection
/// state machine via `read_tls`/`write_tls`/`process_new_packets`.
pub fn new_connection(config: Arc<ClientConfig>, host: &str) -> Result<ClientConnection, LoadError> {
    let name = ServerName::try_from(host.to_string()).map_err(|e| LoadError::InvalidValue {
        path: format!("host \"{host}\""),
        reason: format!("not a valid TLS server name: {e}"),
    })?;
    ClientConnection::new(config, name).map_err(|e| LoadError::InvalidValue {
        path: format!("host \"{host}\""),
        reason: format!("failed to start TLS session: {e}"),
    })
}
