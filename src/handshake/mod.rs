//! Report-channel handshake.
//!
//! # Data Flow
//! ```text
//! Leader shell:
//!     registry.new_handler() → header embedded in the sub-shell command
//!     → handler.recv() (bounded by the handshake timeout)
//!
//! Report connection (first line ">2..."):
//!     report.rs scans status lines
//!     → first line: header → second line: webdav URL
//!     → registry.correlate(header, descriptor) → leader wakes
//!     → connection end fires the descriptor's closed signal
//! ```

pub mod registry;
pub mod report;

pub use registry::{Handler, HandshakeError, HandshakeRegistry, ReportDescriptor};
pub use report::REPORT_PAYLOAD_OFFSET;
