//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → drain connections and tunnels → exit
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: whatever is still open after the grace period is dropped

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
