//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Reverse-proxied request
//!     → pool.rs (BackendSelector::next)
//!     → round_robin.rs (rotate through origins)
//!     → origin.rs (scheme/authority/base path for the rewrite)
//! ```
//!
//! # Design Decisions
//! - Origin pool is fixed at construction; no runtime add/remove
//! - Policy state is private to the policy; callers only see `next()`
//! - No reachability-aware skipping: rotation is strict

pub mod origin;
pub mod pool;
pub mod round_robin;

use std::sync::Arc;

use origin::Origin;

pub use pool::BackendSelector;

/// Trait for backend selection policies.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick the origin for the next request, or `None` for an empty pool.
    fn next_server(&self, origins: &[Arc<Origin>]) -> Option<Arc<Origin>>;
}
