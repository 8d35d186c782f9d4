/// Worker's shared receive scratch buffer size.
pub const RECV_BUF_SIZE: usize = 32 * 1024;
/// Largest single write batched per writable dispatch.
pub const SEND_BUF_SIZE: usize = 32 * 1024;
/// Cyclic reuse boundary for random chunked bodies.
pub const MAX_REQ_LEN: usize = 64 * 1024 * 1024;
/// Upper bound on the `clients` expansion multiplier.
pub const MAX_CLIENTS: u32 = 100_000;
/// Watchdog tick granularity shared by every worker loop.
pub const WATCHDOG_MS: u64 = 100;
/// Generous ceiling on the number of decimal digits a Content-Length may print.
pub const HTTP_CONTENT_LENGTH_DIGITS_MAX: usize = 20;

pub const USER_AGENT: &str = concat!("reqstorm/", env!("CARGO_PKG_VERSION"));
