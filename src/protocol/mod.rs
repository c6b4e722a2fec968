//! Wire formats shared by the hub's sub-protocols.
//!
//! # Data Flow
//! ```text
//! first line of a connection
//!     → route.rs (route tag: report / session / http)
//!
//! report connection bytes
//!     → scanner.rs (sentinel-delimited status lines)
//!     → header.rs (correlation header from the first line)
//! ```

pub mod header;
pub mod route;
pub mod scanner;

pub use header::{Header, HeaderError, HEADER_LEN};
pub use route::{default_first_line, RouteTag};
pub use scanner::{LineScanner, STATUS_SENTINEL};
