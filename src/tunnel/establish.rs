//! CONNECT handling.
//!
//! # Responsibilities
//! - Validate the CONNECT target (`host:port`)
//! - Dial the target before answering the client
//! - Answer 200, take over the client connection once hyper releases it,
//!   and hand both sockets to the pipe
//!
//! # Design Decisions
//! - Dial failures are answered with 503 and the client connection stays usable
//! - The tunnel holds its own tracker guard, so shutdown waits for it too

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response, Uri},
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::config::TimeoutConfig;
use crate::error::ProxyError;
use crate::net::ConnectionTracker;
use crate::observability::metrics;
use crate::tunnel::pipe;
use crate::tunnel::session::TunnelSession;

/// `host:port` of a CONNECT request.
pub fn connect_target(uri: &Uri) -> Result<String, ProxyError> {
    let authority = uri
        .authority()
        .ok_or_else(|| ProxyError::InvalidTarget(format!("CONNECT target {:?} is not host:port", uri.to_string())))?;

    if authority.port_u16().is_none() {
        return Err(ProxyError::InvalidTarget(format!(
            "CONNECT target {} has no port",
            authority
        )));
    }

    Ok(authority.to_string())
}

/// Opens CONNECT tunnels.
#[derive(Debug, Clone)]
pub struct TunnelEstablisher {
    connect_timeout: Duration,
    idle_timeout: Duration,
    tracker: ConnectionTracker,
}

impl TunnelEstablisher {
    pub fn new(timeouts: &TimeoutConfig, tracker: ConnectionTracker) -> Self {
        Self {
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            idle_timeout: Duration::from_secs(timeouts.tunnel_idle_secs),
            tracker,
        }
    }

    /// Dial the target of `request` and, on success, answer 200 and start the tunnel.
    pub async fn establish(&self, request: Request<Body>, peer: SocketAddr) -> Result<Response<Body>, ProxyError> {
        let target = connect_target(request.uri())?;
        tracing::debug!(authority = %target, peer = %peer, "CONNECT requested");

        let origin = match self.dial(&target).await {
            Ok(origin) => origin,
            Err(e) => {
                metrics::record_tunnel("dial_failed");
                tracing::warn!(authority = %target, peer = %peer, error = %e, "CONNECT dial failed");
                return Err(e);
            }
        };

        let guard = self.tracker.track();
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            let _guard = guard;
            // Resolves once hyper has written the 200 and released the connection.
            match hyper::upgrade::on(request).await {
                Ok(upgraded) => {
                    metrics::record_tunnel("established");
                    tracing::info!(authority = %target, peer = %peer, "Tunnel established");
                    let session = TunnelSession::new(TokioIo::new(upgraded), origin, target, peer);
                    pipe::run(session, idle_timeout).await;
                }
                Err(e) => {
                    metrics::record_tunnel("upgrade_failed");
                    tracing::warn!(authority = %target, peer = %peer, error = %e, "Connection takeover failed");
                }
            }
        });

        Ok(Response::new(Body::empty()))
    }

    async fn dial(&self, target: &str) -> Result<TcpStream, ProxyError> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(authority = %target, error = %e, "Failed to set TCP_NODELAY");
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(ProxyError::TunnelDialFailure(format!("dial {}: {}", target, e))),
            Err(_) => Err(ProxyError::TunnelDialFailure(format!(
                "dial {}: timed out after {:?}",
                target, self.connect_timeout
            ))),
        }
    }
}
