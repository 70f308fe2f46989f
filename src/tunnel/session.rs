//! A live CONNECT tunnel.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

/// The two sockets of an established tunnel.
///
/// Created once the upgrade succeeds; consumed by [`crate::tunnel::pipe::run`],
/// which closes both sockets before returning.
#[derive(Debug)]
pub struct TunnelSession<C, O> {
    /// Raw client connection, taken over from the HTTP server.
    pub client: C,
    /// Connection to the CONNECT target.
    pub origin: O,
    /// `host:port` the client asked for.
    pub target: String,
    pub peer: SocketAddr,
}

impl<C, O> TunnelSession<C, O>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    O: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(client: C, origin: O, target: impl Into<String>, peer: SocketAddr) -> Self {
        Self {
            client,
            origin,
            target: target.into(),
            peer,
        }
    }
}

/// Bytes moved through a finished tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_origin: u64,
    pub origin_to_client: u64,
}
