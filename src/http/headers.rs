//! Header hygiene between hops.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers and the headers named by `Connection`
//! - Append the client address to `X-Forwarded-For`
//!
//! # Design Decisions
//! - Applied to the outbound request and to the origin response alike
//! - Prior `X-Forwarded-For` values are extended, never replaced

use std::net::IpAddr;

use axum::http::{header::CONNECTION, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that only describe the current transport leg.
///
/// `Connection` itself is handled separately: its value names more headers
/// to drop before it goes.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "proxy-connection",
    "keep-alive",
    "te",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers and every header listed in `Connection`.
pub fn sanitize(headers: &mut HeaderMap) {
    // Collect first: the names may include headers we are about to remove.
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| HeaderName::from_bytes(token.as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    headers.remove(CONNECTION);

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Extend `X-Forwarded-For` with the immediate client's address.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let client = client_ip.to_string();

    let mut chain = Vec::new();
    for value in headers.get_all(X_FORWARDED_FOR) {
        chain.extend_from_slice(value.as_bytes());
        chain.extend_from_slice(b", ");
    }
    chain.extend_from_slice(client.as_bytes());

    let value = HeaderValue::from_bytes(&chain).unwrap_or_else(|_| {
        tracing::debug!(chain = ?String::from_utf8_lossy(&chain), "Dropping unrepresentable X-Forwarded-For chain");
        HeaderValue::from_str(&client).unwrap_or_else(|_| HeaderValue::from_static(""))
    });
    headers.insert(X_FORWARDED_FOR, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn removes_fixed_hop_by_hop_set() {
        let mut map = headers(&[
            ("Proxy-Connection", "keep-alive"),
            ("Keep-Alive", "timeout=5"),
            ("TE", "trailers"),
            ("Transfer-Encoding", "chunked"),
            ("Upgrade", "websocket"),
            ("Accept", "*/*"),
        ]);
        sanitize(&mut map);

        for name in HOP_BY_HOP_HEADERS {
            assert!(!map.contains_key(*name), "{} survived", name);
        }
        assert_eq!(map.get("accept").unwrap(), "*/*");
    }

    #[test]
    fn removes_connection_listed_headers() {
        let mut map = headers(&[
            ("Connection", "X-Secret , close"),
            ("Connection", " X-Other,,"),
            ("X-Secret", "1"),
            ("X-Other", "2"),
            ("X-Kept", "3"),
        ]);
        sanitize(&mut map);

        assert!(!map.contains_key("connection"));
        assert!(!map.contains_key("x-secret"));
        assert!(!map.contains_key("x-other"));
        assert_eq!(map.get("x-kept").unwrap(), "3");
    }

    #[test]
    fn ignores_invalid_connection_tokens() {
        let mut map = headers(&[("Connection", "bad header, X-Drop"), ("X-Drop", "1")]);
        sanitize(&mut map);
        assert!(map.is_empty());
    }

    #[test]
    fn empty_map_is_noop() {
        let mut map = HeaderMap::new();
        sanitize(&mut map);
        assert!(map.is_empty());
    }

    #[test]
    fn preserves_duplicate_end_to_end_values() {
        let mut map = headers(&[("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")]);
        sanitize(&mut map);
        let values: Vec<_> = map.get_all("set-cookie").iter().collect();
        assert_eq!(values, ["a=1", "b=2"]);
    }

    #[test]
    fn forwarded_for_starts_chain() {
        let mut map = HeaderMap::new();
        append_forwarded_for(&mut map, "10.0.0.5".parse().unwrap());
        assert_eq!(map.get(X_FORWARDED_FOR).unwrap(), "10.0.0.5");
    }

    #[test]
    fn forwarded_for_extends_prior_values() {
        let mut map = headers(&[
            ("X-Forwarded-For", "203.0.113.7"),
            ("X-Forwarded-For", "198.51.100.2, 192.0.2.1"),
        ]);
        append_forwarded_for(&mut map, "::1".parse().unwrap());

        let values: Vec<_> = map.get_all(X_FORWARDED_FOR).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "203.0.113.7, 198.51.100.2, 192.0.2.1, ::1");
    }

    #[test]
    fn forwarded_for_keeps_opaque_bytes() {
        let mut map = HeaderMap::new();
        map.insert(X_FORWARDED_FOR, HeaderValue::from_bytes(b"\xff203.0.113.7").unwrap());
        append_forwarded_for(&mut map, "10.0.0.5".parse().unwrap());

        assert_eq!(
            map.get(X_FORWARDED_FOR).unwrap().as_bytes(),
            b"\xff203.0.113.7, 10.0.0.5"
        );
    }
}
