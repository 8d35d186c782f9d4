pub mod dns;
pub mod keepalive;
pub mod tls;
