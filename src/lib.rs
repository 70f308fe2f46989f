//! waypoint: forward, CONNECT-tunneling and load-balancing reverse HTTP proxy.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod tunnel;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
