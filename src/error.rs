//! Per-request error taxonomy.
//!
//! Every variant maps to the status the client sees. None of these errors
//! escape the task handling the request; startup failures live in
//! [`crate::config::ConfigError`] instead.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Failure while handling a single proxied request or tunnel.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Forward-proxy target uses a scheme other than `http`/`https`.
    #[error("unsupported protocol scheme {0}")]
    UnsupportedScheme(String),

    /// Request target cannot be dialed (e.g. CONNECT without a port).
    #[error("{0}")]
    InvalidTarget(String),

    /// Method is not served by this listener's mode.
    #[error("{0}")]
    MethodNotAllowed(&'static str),

    /// Dial, connect or timeout failure talking to an origin.
    #[error("{0}")]
    OriginUnreachable(String),

    /// CONNECT target could not be dialed.
    #[error("{0}")]
    TunnelDialFailure(String),

    /// Mid-transfer I/O failure.
    #[error("streaming error: {0}")]
    Streaming(#[from] std::io::Error),

    /// Unexpected proxy state, e.g. reverse mode without an origin pool.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnsupportedScheme(_) | ProxyError::InvalidTarget(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::OriginUnreachable(_) | ProxyError::TunnelDialFailure(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::Streaming(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self),
        )
            .into_response()
    }
}

/// Render an error with all of its sources, `outer: inner: root`.
///
/// hyper's client errors only say "client error (Connect)" at the top level;
/// the useful text lives further down the chain.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}
