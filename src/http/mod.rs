//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (hyper http1, dispatch by mode and method)
//!     → CONNECT: tunnel subsystem
//!     → otherwise: request.rs (rewrite for the origin)
//!                  → headers.rs (hop-by-hop removal, X-Forwarded-For)
//!                  → forwarder.rs (send, stream the answer back)
//! ```

pub mod forwarder;
pub mod headers;
pub mod request;
pub mod server;

pub use forwarder::Forwarder;
pub use server::{dispatch_for, Dispatch, ProxyServer};
