//! waypoint proxy binary.
//!
//! ```text
//! waypoint --listen 127.0.0.1:9999                       # forward proxy + CONNECT
//! waypoint --mode connect --listen 127.0.0.1:9999        # CONNECT tunnels only
//! waypoint --mode reverse --backend 127.0.0.1:7001 --backend 127.0.0.1:7002
//! waypoint --mode reverse --backend 127.0.0.1:7001 --cert cert.pem --key key.pem
//! waypoint --config waypoint.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use waypoint::config::validation::validate_config;
use waypoint::config::{parse_config, BackendConfig, ConfigError, ProxyConfig, ProxyMode, TlsConfig};
use waypoint::lifecycle::{signals, Shutdown};
use waypoint::net::Listener;
use waypoint::observability::{logging, metrics};
use waypoint::ProxyServer;

#[derive(Debug, Parser)]
#[command(name = "waypoint", version, about = "Forward, tunneling and reverse HTTP proxy")]
struct Cli {
    /// TOML configuration file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:9999.
    #[arg(long)]
    listen: Option<String>,

    /// forward, connect_only or reverse.
    #[arg(long)]
    mode: Option<ProxyMode>,

    /// Origin for reverse mode; repeat to load balance.
    #[arg(long = "backend")]
    backends: Vec<String>,

    /// PEM certificate chain; enables TLS together with --key.
    #[arg(long, requires = "key")]
    cert: Option<String>,

    /// PEM private key.
    #[arg(long, requires = "cert")]
    key: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => parse_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if !self.backends.is_empty() {
            config.backends = self.backends.into_iter().map(BackendConfig::new).collect();
        }
        if let (Some(cert_path), Some(key_path)) = (self.cert, self.key) {
            config.listener.tls = Some(TlsConfig { cert_path, key_path });
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), mode = %config.mode, "waypoint starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener_config = config.listener.clone();
    let server = ProxyServer::new(config)?;
    let listener = Listener::bind(&listener_config).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
