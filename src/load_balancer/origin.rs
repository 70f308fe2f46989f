//! Origin abstraction.
//!
//! # Responsibilities
//! - Represent a single origin server (scheme, authority, base path, query)
//! - Parse origin addresses from configuration
//! - Derive the origin named by a forward-proxy request target

use axum::http::Uri;
use url::Url;

use crate::error::ProxyError;

/// Why an origin address was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("unsupported scheme {0:?}, expected http or https")]
    Scheme(String),
    #[error("missing host")]
    MissingHost,
}

/// A single origin server. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    name: String,
    scheme: String,
    authority: String,
    base_path: String,
    query: Option<String>,
}

impl Origin {
    /// Parse an origin from configuration.
    ///
    /// Bare `host:port` addresses are treated as `http://host:port`.
    pub fn parse(address: &str) -> Result<Self, OriginError> {
        let address = address.trim();
        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let url = Url::parse(&with_scheme).map_err(|e| OriginError::Url(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(OriginError::Scheme(other.to_string())),
        }

        let host = url.host_str().ok_or(OriginError::MissingHost)?;
        // `Url` drops a default port; keep whatever port the address spelled.
        let spelled_port = with_scheme
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.authority().and_then(|a| a.port_u16()));
        let authority = match url.port().or(spelled_port) {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            name: address.to_string(),
            scheme: url.scheme().to_string(),
            authority,
            base_path: url.path().to_string(),
            query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// Origin named by an absolute-form forward-proxy target.
    ///
    /// Only the scheme and authority are taken; the target's own path and
    /// query are the inbound side of the rewrite.
    pub fn from_request_target(uri: &Uri) -> Result<Self, ProxyError> {
        let scheme = uri.scheme_str().unwrap_or_default();
        if scheme != "http" && scheme != "https" {
            return Err(ProxyError::UnsupportedScheme(scheme.to_string()));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| ProxyError::InvalidTarget("missing host in request target".into()))?;

        Ok(Self {
            name: authority.to_string(),
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            base_path: String::new(),
            query: None,
        })
    }

    /// Override the label used in logs and metrics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)
    }
}
