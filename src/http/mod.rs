//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection surfaced by the switch listener
//!     → server.rs (Axum setup, request ID, tracing)
//!     → /proc/lcode-version, or
//!     → SessionDirectory::dispatch (host pattern, longest workdir prefix)
//!     → matched session's WebDAV handler
//! ```

pub mod server;

pub use server::{hub_version, HttpServer, MakeRequestUuid, VERSION_PATH};
