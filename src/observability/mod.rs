//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline, server, client and di subsystems produce:
//!     → tracing events and spans (logging.rs installs the subscriber)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;
