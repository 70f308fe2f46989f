//! Proxy server: accept loop, per-connection HTTP/1.1, dispatch.
//!
//! # Responsibilities
//! - Accept connections (bounded) and optionally terminate TLS
//! - Serve each connection with hyper, upgrades enabled for CONNECT
//! - Dispatch every request by mode and method: tunnel, forward or reject
//! - Forward through the axum router (origin selection, rewrite, relay)
//! - Drain connections and tunnels on shutdown
//!
//! # Design Decisions
//! - CONNECT is dispatched before the router; axum never sees tunnels
//! - Per-request failures become responses; the accept loop only stops on shutdown
//! - No global state: everything hangs off the `ProxyServer` value

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, Response},
    response::IntoResponse,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ProxyConfig, ProxyMode};
use crate::error::ProxyError;
use crate::http::forwarder::Forwarder;
use crate::http::request::build_outbound;
use crate::load_balancer::origin::Origin;
use crate::load_balancer::BackendSelector;
use crate::net::tls::load_tls_acceptor;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::tunnel::TunnelEstablisher;

pub const CONNECT_ONLY_MESSAGE: &str = "this proxy only supports CONNECT";
pub const REVERSE_CONNECT_MESSAGE: &str = "CONNECT is not supported by a reverse proxy";

/// `origin` label for forwarded requests whose target the client chose.
pub const FORWARD_LABEL: &str = "forward";
/// `origin` label for CONNECT requests.
pub const TUNNEL_LABEL: &str = "tunnel";

/// What to do with a request, decided from mode and method alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Tunnel,
    Forward,
    Reject(&'static str),
}

pub fn dispatch_for(mode: ProxyMode, method: &Method) -> Dispatch {
    match (mode, *method == Method::CONNECT) {
        (ProxyMode::Forward | ProxyMode::ConnectOnly, true) => Dispatch::Tunnel,
        (ProxyMode::Reverse, true) => Dispatch::Reject(REVERSE_CONNECT_MESSAGE),
        (ProxyMode::ConnectOnly, false) => Dispatch::Reject(CONNECT_ONLY_MESSAGE),
        (ProxyMode::Forward | ProxyMode::Reverse, false) => Dispatch::Forward,
    }
}

/// State shared by forward handlers.
#[derive(Clone)]
pub struct AppState {
    pub mode: ProxyMode,
    pub selector: Option<Arc<BackendSelector>>,
    pub forwarder: Forwarder,
}

impl AppState {
    fn origin_for(&self, request: &Request<Body>) -> Result<Arc<Origin>, ProxyError> {
        match (self.mode, &self.selector) {
            (ProxyMode::Reverse, Some(selector)) => Ok(selector.next()),
            (ProxyMode::Reverse, None) => Err(ProxyError::Internal("no origins configured".into())),
            _ => Origin::from_request_target(request.uri()).map(Arc::new),
        }
    }

    /// Metrics label for `origin`. Only configured origins get their own series.
    fn origin_label<'a>(&self, origin: &'a Origin) -> &'a str {
        match self.mode {
            ProxyMode::Reverse => origin.name(),
            ProxyMode::Forward | ProxyMode::ConnectOnly => FORWARD_LABEL,
        }
    }
}

/// Per-connection request handler.
#[derive(Clone)]
struct ProxyService {
    mode: ProxyMode,
    router: Router,
    tunnels: TunnelEstablisher,
}

impl ProxyService {
    async fn handle(self, request: Request<Body>, peer: SocketAddr) -> Response<Body> {
        match dispatch_for(self.mode, request.method()) {
            Dispatch::Tunnel => {
                let start = Instant::now();
                let target = request.uri().to_string();
                let response = match self.tunnels.establish(request, peer).await {
                    Ok(response) => response,
                    Err(e) => e.into_response(),
                };
                tracing::debug!(uri = %target, peer = %peer, status = response.status().as_u16(), "CONNECT answered");
                metrics::record_request("CONNECT", response.status().as_u16(), TUNNEL_LABEL, start);
                response
            }
            Dispatch::Reject(message) => {
                tracing::debug!(method = %request.method(), peer = %peer, "Rejected by mode");
                ProxyError::MethodNotAllowed(message).into_response()
            }
            Dispatch::Forward => match self.router.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
        }
    }
}

/// The proxy, built from configuration and run on a listener.
pub struct ProxyServer {
    mode: ProxyMode,
    router: Router,
    tunnels: TunnelEstablisher,
    tracker: ConnectionTracker,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Duration,
    shutdown_grace: Duration,
}

impl ProxyServer {
    /// Build the server. Fails on bad origins or TLS material.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let tracker = ConnectionTracker::new();

        let selector = match config.mode {
            ProxyMode::Reverse => {
                let selector = BackendSelector::from_config(&config.backends)?;
                for origin in selector.origins() {
                    tracing::info!(origin = %origin, "Origin registered");
                }
                Some(Arc::new(selector))
            }
            ProxyMode::Forward | ProxyMode::ConnectOnly => None,
        };

        let tls = match &config.listener.tls {
            Some(tls) => Some(load_tls_acceptor(Path::new(&tls.cert_path), Path::new(&tls.key_path))?),
            None => None,
        };

        let state = AppState {
            mode: config.mode,
            selector,
            forwarder: Forwarder::new(&config.timeouts)?,
        };

        Ok(Self {
            mode: config.mode,
            router: Self::build_router(state),
            tunnels: TunnelEstablisher::new(&config.timeouts, tracker.clone()),
            tracker,
            tls,
            handshake_timeout: Duration::from_secs(config.timeouts.connect_secs),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(forward_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Terminate TLS with `acceptor` instead of the configured files.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        let address = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %address,
            mode = %self.mode,
            tls = self.tls.is_some(),
            "Proxy listening"
        );

        let service = ProxyService {
            mode: self.mode,
            router: self.router.clone(),
            tunnels: self.tunnels.clone(),
        };
        let stop = CancellationToken::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(connection) => connection,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            let guard = self.tracker.track();
            let service = service.clone();
            let tls = self.tls.clone();
            let stop = stop.clone();
            let handshake_timeout = self.handshake_timeout;

            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                }

                match tls {
                    Some(acceptor) => {
                        match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                            Ok(Ok(stream)) => serve_connection(stream, peer, service, stop).await,
                            Ok(Err(e)) => tracing::debug!(peer = %peer, error = %e, "TLS handshake failed"),
                            Err(_) => tracing::debug!(peer = %peer, "TLS handshake timed out"),
                        }
                    }
                    None => serve_connection(stream, peer, service, stop).await,
                }
            });
        }

        tracing::info!(
            active = self.tracker.active_count(),
            grace = ?self.shutdown_grace,
            "Stopped accepting, draining"
        );
        stop.cancel();

        if self.tracker.wait_for_drain(self.shutdown_grace).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Grace period elapsed with connections still open"
            );
        }
        Ok(())
    }
}

async fn serve_connection<S>(stream: S, peer: SocketAddr, service: ProxyService, stop: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let svc = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        let service = service.clone();
        request.extensions_mut().insert(ConnectInfo(peer));
        async move { Ok::<_, Infallible>(service.handle(request.map(Body::new), peer).await) }
    });

    let connection = http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(TokioIo::new(stream), svc)
        .with_upgrades();
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = stop.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
    }
}

/// Forward a non-CONNECT request to its origin and relay the answer.
async fn forward_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let start = Instant::now();
    let method = request.method().to_string();

    let origin = match state.origin_for(&request) {
        Ok(origin) => origin,
        Err(e) => {
            tracing::debug!(uri = %request.uri(), error = %e, "No origin for request");
            metrics::record_request(&method, e.status().as_u16(), "none", start);
            return e.into_response();
        }
    };

    tracing::debug!(method = %method, origin = %origin, peer = %peer, "Forwarding request");

    let result = match build_outbound(request, &origin, peer) {
        Ok(outbound) => state.forwarder.forward(outbound).await,
        Err(e) => Err(e),
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    metrics::record_request(&method, response.status().as_u16(), state.origin_label(&origin), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    #[test]
    fn dispatch_table() {
        let cases = [
            (ProxyMode::Forward, Method::CONNECT, Dispatch::Tunnel),
            (ProxyMode::Forward, Method::GET, Dispatch::Forward),
            (ProxyMode::ConnectOnly, Method::CONNECT, Dispatch::Tunnel),
            (ProxyMode::ConnectOnly, Method::POST, Dispatch::Reject(CONNECT_ONLY_MESSAGE)),
            (ProxyMode::Reverse, Method::GET, Dispatch::Forward),
            (ProxyMode::Reverse, Method::CONNECT, Dispatch::Reject(REVERSE_CONNECT_MESSAGE)),
        ];
        for (mode, method, expected) in cases {
            assert_eq!(dispatch_for(mode, &method), expected, "{} {}", mode, method);
        }
    }

    #[test]
    fn reverse_mode_needs_parseable_origins() {
        let config = ProxyConfig {
            mode: ProxyMode::Reverse,
            backends: vec![BackendConfig::new("ftp://files.internal")],
            ..ProxyConfig::default()
        };
        assert!(ProxyServer::new(config).is_err());
    }

    #[tokio::test]
    async fn forward_mode_picks_target_origin() {
        let state = AppState {
            mode: ProxyMode::Forward,
            selector: None,
            forwarder: Forwarder::new(&Default::default()).unwrap(),
        };
        let request = Request::builder()
            .uri("http://example.org:8080/x")
            .body(Body::empty())
            .unwrap();
        let origin = state.origin_for(&request).unwrap();
        assert_eq!(origin.authority(), "example.org:8080");

        let request = Request::builder().uri("ftp://example.org/x").body(Body::empty()).unwrap();
        let err = state.origin_for(&request).unwrap_err();
        assert_eq!(err.to_string(), "unsupported protocol scheme ftp");
    }

    #[tokio::test]
    async fn only_configured_origins_label_metrics() {
        let forward = AppState {
            mode: ProxyMode::Forward,
            selector: None,
            forwarder: Forwarder::new(&Default::default()).unwrap(),
        };
        for target in ["http://a.example:8080/", "http://b.example/"] {
            let uri: axum::http::Uri = target.parse().unwrap();
            let origin = Origin::from_request_target(&uri).unwrap();
            assert_eq!(forward.origin_label(&origin), FORWARD_LABEL);
        }

        let reverse = AppState {
            mode: ProxyMode::Reverse,
            ..forward
        };
        let origin = Origin::parse("127.0.0.1:7001").unwrap().with_name("backend1");
        assert_eq!(reverse.origin_label(&origin), "backend1");
    }

    #[tokio::test]
    async fn reverse_mode_rotates_origins() {
        let selector = BackendSelector::from_config(&[
            BackendConfig::new("127.0.0.1:7001"),
            BackendConfig::new("127.0.0.1:7002"),
        ])
        .unwrap();
        let state = AppState {
            mode: ProxyMode::Reverse,
            selector: Some(Arc::new(selector)),
            forwarder: Forwarder::new(&Default::default()).unwrap(),
        };
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let picked: Vec<String> = (0..3)
            .map(|_| state.origin_for(&request).unwrap().authority().to_string())
            .collect();
        assert_eq!(picked, ["127.0.0.1:7001", "127.0.0.1:7002", "127.0.0.1:7001"]);
    }
}
