//! TLS termination for the client-facing listener.
//!
//! TLS 1.3 only, server cipher preference, ALPN `http/1.1`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::ConfigError;

/// Load a certificate chain and private key from PEM files.
pub fn load_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ConfigError> {
    let cert_pem = fs::read(cert_path)
        .map_err(|e| ConfigError::Tls(format!("failed to read certificate {:?}: {}", cert_path, e)))?;
    let key_pem = fs::read(key_path)
        .map_err(|e| ConfigError::Tls(format!("failed to read private key {:?}: {}", key_path, e)))?;

    let acceptor = tls_acceptor_from_pem(&cert_pem, &key_pem)?;
    tracing::info!(cert = ?cert_path, "TLS enabled");
    Ok(acceptor)
}

pub fn tls_acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor, ConfigError> {
    let config = server_config(cert_pem, key_pem)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig, ConfigError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<_, _>>()
        .map_err(|e| ConfigError::Tls(format!("failed to parse certificates: {}", e)))?;
    if certs.is_empty() {
        return Err(ConfigError::Tls("no certificates found".into()));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ConfigError::Tls(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| ConfigError::Tls("no private key found".into()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ConfigError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConfigError::Tls(format!("certificate rejected: {}", e)))?;

    config.ignore_client_order = true;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(config)
}
