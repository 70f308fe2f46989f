//! Request rewriting for the next hop.
//!
//! # Responsibilities
//! - Rebind the inbound request to an origin (scheme, authority, joined path, merged query)
//! - Strip hop-by-hop headers and extend `X-Forwarded-For`
//! - Prepare the request for re-dispatch as a fresh client request
//!
//! # Design Decisions
//! - Body is moved, never buffered
//! - Scheme and authority come only from the origin
//! - Paths are joined in their escaped form; `http::Uri` keeps no decoded copy

use std::net::SocketAddr;

use axum::{
    body::Body,
    http::{header::USER_AGENT, Extensions, HeaderValue, Request, Uri, Version},
};

use crate::error::ProxyError;
use crate::http::headers::{append_forwarded_for, sanitize};
use crate::load_balancer::origin::Origin;

/// Join two path segments with exactly one `/` at the junction.
pub fn single_joining_slash(base: &str, path: &str) -> String {
    let base_slash = base.ends_with('/');
    let path_slash = path.starts_with('/');
    match (base_slash, path_slash) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Origin's fixed query first, then the inbound one; `&` only when both are present.
pub fn merge_query(origin: Option<&str>, inbound: Option<&str>) -> String {
    let origin = origin.unwrap_or_default();
    let inbound = inbound.unwrap_or_default();
    if origin.is_empty() || inbound.is_empty() {
        format!("{}{}", origin, inbound)
    } else {
        format!("{}&{}", origin, inbound)
    }
}

/// Outbound URI for `inbound` when sent to `origin`.
pub fn rewrite_uri(inbound: &Uri, origin: &Origin) -> Result<Uri, ProxyError> {
    let path = single_joining_slash(origin.base_path(), inbound.path());
    let query = merge_query(origin.query(), inbound.query());

    let mut target = format!("{}://{}{}", origin.scheme(), origin.authority(), path);
    if !query.is_empty() {
        target.push('?');
        target.push_str(&query);
    }

    target
        .parse()
        .map_err(|e| ProxyError::Internal(format!("invalid outbound URI {:?}: {}", target, e)))
}

/// Turn an inbound request into the outbound request for `origin`.
pub fn build_outbound(
    inbound: Request<Body>,
    origin: &Origin,
    client: SocketAddr,
) -> Result<Request<Body>, ProxyError> {
    let (mut parts, body) = inbound.into_parts();

    parts.uri = rewrite_uri(&parts.uri, origin)?;

    // Fresh client request: no inbound framing, upgrade handles or connection info.
    parts.version = Version::HTTP_11;
    parts.extensions = Extensions::new();

    sanitize(&mut parts.headers);
    append_forwarded_for(&mut parts.headers, client.ip());

    if !parts.headers.contains_key(USER_AGENT) {
        // Explicitly empty so nothing downstream fills in its own default.
        parts.headers.insert(USER_AGENT, HeaderValue::from_static(""));
    }

    Ok(Request::from_parts(parts, body))
}
