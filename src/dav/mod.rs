//! WebDAV session subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request (Host, path)
//!     → host.rs (logical host via capture group)
//!     → directory.rs (longest workdir prefix for that host)
//!     → service.rs (matched session's WebDAV handler)
//!
//! Session lifecycle:
//!     follower shell opens → directory.open(host, pwd)
//!     shell ends / leader forces close → directory.close(session)
//! ```

pub mod directory;
pub mod host;
pub mod service;

pub use directory::{DavSession, DirectoryError, SessionDirectory};
pub use host::{declared_host, HostMatchError, HostPattern, DEFAULT_HOST_PATTERN};
pub use service::{DavHandlerFactory, DavService, UnavailableDavFactory};
