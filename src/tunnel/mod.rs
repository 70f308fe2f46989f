//! CONNECT tunneling subsystem.
//!
//! # Data Flow
//! ```text
//! CONNECT host:port
//!     → establish.rs (validate target, dial, answer 200, take over connection)
//!     → session.rs (client socket + origin socket)
//!     → pipe.rs (copy bytes both ways until either side closes)
//! ```

pub mod establish;
pub mod pipe;
pub mod session;

pub use establish::{connect_target, TunnelEstablisher};
pub use session::{TunnelSession, TunnelStats};
