//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout via the fmt layer
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`connection_id`, `route`, `host`, `workdir`) rather
//!   than formatted messages
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
