//! Executes outbound requests against origins.
//!
//! # Responsibilities
//! - Send the rewritten request through a pooled client (http or https origins)
//! - Stream the origin response back without buffering
//! - Sanitize response headers, keep the status as-is
//! - Map dial/connect/timeout failures to 503
//!
//! # Design Decisions
//! - A dropped response (client went away) drops the origin body and frees
//!   the origin connection
//! - Mid-body failures are logged here; hyper then tears that connection down

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
};
use http_body_util::BodyExt;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::{ConfigError, TimeoutConfig};
use crate::error::{error_chain, ProxyError};
use crate::http::headers::sanitize;

pub type OriginClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Sends outbound requests and relays the origin's answer.
#[derive(Clone)]
pub struct Forwarder {
    client: OriginClient,
    request_timeout: Duration,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, ConfigError> {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        http.set_nodelay(true);
        // The https connector decides the scheme; the inner connector must accept both.
        http.enforce_http(false);

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| ConfigError::Tls(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            request_timeout: Duration::from_secs(timeouts.request_secs),
        })
    }

    /// Execute `outbound` and return the origin's response for the client.
    pub async fn forward(&self, outbound: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let target = outbound.uri().clone();

        let response = match tokio::time::timeout(self.request_timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let reason = error_chain(&e);
                tracing::warn!(uri = %target, error = %reason, "Origin request failed");
                return Err(ProxyError::OriginUnreachable(reason));
            }
            Err(_) => {
                tracing::warn!(uri = %target, timeout = ?self.request_timeout, "Origin timed out");
                return Err(ProxyError::OriginUnreachable(format!(
                    "origin {} did not respond within {:?}",
                    target, self.request_timeout
                )));
            }
        };

        let (mut parts, body) = response.into_parts();
        sanitize(&mut parts.headers);

        let body = body.map_err(move |e| {
            tracing::warn!(uri = %target, error = %e, "Streaming error relaying origin body");
            e
        });

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_origin_is_503() {
        // Bind then drop to get a port with nothing listening.
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let forwarder = Forwarder::new(&TimeoutConfig::default()).unwrap();
        let request = Request::builder()
            .uri(format!("http://{}/", addr))
            .body(Body::empty())
            .unwrap();

        let err = forwarder.forward(request).await.unwrap_err();
        assert!(matches!(err, ProxyError::OriginUnreachable(_)));
        assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
