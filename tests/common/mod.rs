//! Shared utilities for integration tests.
//!
//! Everything binds `127.0.0.1:0`, so tests can run in parallel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;

use waypoint::config::ProxyConfig;
use waypoint::lifecycle::Shutdown;
use waypoint::net::Listener;
use waypoint::ProxyServer;

/// A proxy running in the background until dropped.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// reqwest client that sends every http request through this proxy.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::http(self.url()).unwrap())
            .build()
            .unwrap()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let server = ProxyServer::new(config).unwrap();
    run_proxy(server).await
}

pub async fn start_tls_proxy(config: ProxyConfig, acceptor: TlsAcceptor) -> TestProxy {
    let server = ProxyServer::new(config).unwrap().with_tls(acceptor);
    run_proxy(server).await
}

async fn run_proxy(server: ProxyServer) -> TestProxy {
    let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = inner.local_addr().unwrap();
    let listener = Listener::new(inner, 128);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy { addr, shutdown }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Backend that answers with a dump of what it received:
/// `METHOD URI`, one `name: value` line per header, a blank line, the body.
pub async fn start_echo_backend() -> SocketAddr {
    serve(Router::new().fallback(dump_request)).await
}

async fn dump_request(request: Request<Body>) -> String {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut dump = format!("{} {}\n", parts.method, parts.uri);
    for (name, value) in &parts.headers {
        dump.push_str(&format!("{}: {}\n", name, String::from_utf8_lossy(value.as_bytes())));
    }
    dump.push('\n');
    dump.push_str(&String::from_utf8_lossy(&body));
    dump
}

/// Backend that always answers with its own name.
pub async fn start_named_backend(name: &'static str) -> SocketAddr {
    serve(Router::new().fallback(move || async move { name })).await
}

/// Backend that writes `response` verbatim to every connection, then closes.
pub async fn start_raw_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Backend that streams a chunked body forever to its first connection.
///
/// The receiver fires once a write fails, i.e. once the proxy let go of the
/// connection.
pub async fn start_endless_backend() -> (SocketAddr, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (released_tx, released_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;

        let chunk = format!("400\r\n{}\r\n", "x".repeat(1024));
        let mut written = socket
            .write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n")
            .await;
        while written.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
            written = socket.write_all(chunk.as_bytes()).await;
        }
        let _ = released_tx.send(());
    });

    (addr, released_rx)
}

/// Plain TCP echo server.
pub async fn start_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// An address with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Send a raw request (which should ask for `Connection: close`) and read until EOF.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    String::from_utf8_lossy(&response).into_owned()
}

/// Read a response head (through the blank line) without consuming anything after it.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_ne!(n, 0, "connection closed inside response head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Read a response head and its `Content-Length` body.
pub async fn read_response(stream: &mut TcpStream) -> (String, String) {
    let head = read_head(stream).await;
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();
    (head, String::from_utf8_lossy(&body).into_owned())
}

/// Self-signed certificate for `localhost`: (cert PEM, key PEM, cert DER).
pub fn self_signed() -> (String, String, rustls::pki_types::CertificateDer<'static>) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    (
        certified.cert.pem(),
        certified.signing_key.serialize_pem(),
        certified.cert.der().clone(),
    )
}
