//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stderr
//!     → Metrics endpoint (Prometheus scrape, when enabled)
//! ```

pub mod logging;
pub mod metrics;
