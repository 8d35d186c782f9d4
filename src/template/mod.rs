mod loader;
mod validate;
pub mod types;

pub use loader::load_file;
#[cfg(test)]
pub use loader::load_str;
pub use types::{Body, ClosePolicy, ConnectionTemplate, ExpandedConnection, Scheme, TcpKeepAlive};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_get_defaults() {
        let conns = load_str(
            r#"[{ "host": "127.0.0.1", "port": 18080, "method": "GET", "path": "/", "max-requests": 10 }]"#,
        )
        .unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].template.reqs_max, 10);
        assert!(!conns[0].duplicate);
    }

    #[test]
    fn clients_expansion_produces_n_connections() {
        let conns = load_str(
            r#"[{ "host": "h", "port": 80, "clients": 4, "max-requests": 2 }]"#,
        )
        .unwrap();
        assert_eq!(conns.len(), 4);
        assert!(!conns[0].duplicate);
        assert!(conns[1].duplicate && conns[2].duplicate && conns[3].duplicate);
        assert_eq!(conns[3].sibling_index, 3);
    }

    #[test]
    fn delay_min_greater_than_max_is_fatal() {
        let err = load_str(
            r#"[{ "host": "h", "port": 80, "delay": { "min": 100, "max": 10 } }]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("delay.min"));
    }

    #[test]
    fn random_body_without_size_is_fatal() {
        let err = load_str(
            r#"[{ "host": "h", "port": 80, "body": { "type": "random" } }]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("body.size"));
    }

    #[test]
    fn clients_over_max_is_fatal() {
        let err = load_str(
            r#"[{ "host": "h", "port": 80, "clients": 999999999 }]"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("clients"));
    }

    #[test]
    fn unknown_key_is_fatal() {
        let err = load_str(r#"[{ "host": "h", "port": 80, "bogus": 1 }]"#).unwrap_err();
        assert!(err.to_string().contains("bogus") || err.to_string().contains("unknown"));
    }

    #[test]
    fn missing_host_is_fatal() {
        let err = load_str(r#"[{ "port": 80 }]"#).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("host"));
    }

    #[test]
    fn legacy_bare_string_body_is_accepted() {
        let conns = load_str(r#"[{ "host": "h", "port": 80, "body": "hello" }]"#).unwrap();
        match &conns[0].template.body {
            Body::Content(bytes) => assert_eq!(bytes, b"hello"),
            other => panic!("expected Body::Content, got {other:?}"),
        }
    }

    #[test]
    fn close_linger_value_is_the_seconds_and_enables_it() {
        let conns = load_str(r#"[{ "host": "h", "port": 80, "close": { "linger": 5 } }]"#).unwrap();
        assert!(conns[0].template.close.linger);
        assert_eq!(conns[0].template.close.linger_secs, 5);
    }

    #[test]
    fn close_without_linger_key_leaves_it_disabled() {
        let conns = load_str(r#"[{ "host": "h", "port": 80, "close": { "client": true } }]"#).unwrap();
        assert!(!conns[0].template.close.linger);
        assert_eq!(conns[0].template.close.linger_secs, 0);
    }
}
