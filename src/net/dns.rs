use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::error::LoadError;

/// Reads `NAMESERVER0`, `NAMESERVER1`, ... overrides at startup. Resolution
/// itself delegates to the OS resolver via `ToSocketAddrs`; these overrides
/// are recorded and logged rather than used to drive a bespoke resolver —
/// honoring custom nameservers end-to-end would mean shipping one.
pub fn configured_nameservers() -> Vec<String> {
    let mut servers = Vec::new();
    for idx in 0.. {
        let Ok(value) = std::env::var(format!("NAMESERVER{idx}")) else {
            break;
        };
        servers.push(value);
    }
    servers
}

/// Resolves `host:port` to a single destination address. If `host` is
/// already a literal IP, this never touches the resolver.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, LoadError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .map_err(|e| LoadError::InvalidValue {
            path: format!("host \"{host}\""),
            reason: format!("resolution failed: {e}"),
        })?
        .next()
        .ok_or_else(|| LoadError::InvalidValue {
            path: format!("host \"{host}\""),
            reason: "resolver returned no addresses".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_ip_resolves_without_lookup() {
        let addr = resolve("127.0.0.1", 8080).unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());
    }
}
