use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    None,
    Content(Vec<u8>),
    Random { size: usize },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpKeepAlive {
    pub enable: bool,
    pub idle: u32,
    pub intvl: u32,
    pub cnt: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClosePolicy {
    pub client: bool,
    pub linger: bool,
    pub linger_secs: u32,
}

/// Immutable, parsed form of one JSON array element (before `clients`
/// expansion). Shared by every sibling a template expands into behind an
/// `Arc`, since nothing past load time ever needs to mutate it.
#[derive(Debug, Clone)]
pub struct ConnectionTemplate {
    /// Position of this template in the source JSON array; seeds the PRNG
    /// used for random body generation so distinct templates never collide.
    pub index: usize,
    pub host: String,
    pub port: u16,
    pub host_from: Option<String>,
    pub scheme: Scheme,
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub tcp_keep_alive: TcpKeepAlive,
    pub close: ClosePolicy,
    pub reqs_max: u64,
    pub keep_alive_reqs: u64,
    pub tls_session_reuse: bool,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub ramp_up_ms: u64,
    pub clients: u32,
}

impl ConnectionTemplate {
    pub fn default_port_for_scheme(&self) -> bool {
        matches!(
            (self.scheme, self.port),
            (Scheme::Http, 80) | (Scheme::Https, 443)
        )
    }
}

/// One connection as it comes out of the `clients: N` expansion: a shared
/// reference to the parsed template plus the sibling's own identity.
#[derive(Debug, Clone)]
pub struct ExpandedConnection {
    pub template: std::sync::Arc<ConnectionTemplate>,
    /// 0 for the primary connection, 1..N-1 for its siblings.
    pub sibling_index: u32,
    /// Shallow-copy flag: true for every connection but the primary.
    /// Duplicates never own the primary's request buffers — they build
    /// their own from the shared template.
    pub duplicate: bool,
}
