//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → classifier.rs (first-line sniffing, grace-period fallback)
//!     → replay.rs (consumed bytes handed back before the socket)
//!     → connection.rs (classified connection handle)
//!     → ConnectionPolicy: report registry | session server | HTTP
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - One task per connection; classification never serializes accepts
//! - Downstream consumers always see the original byte stream

pub mod classifier;
pub mod connection;
pub mod listener;
pub mod replay;

pub use classifier::{Classified, Classifier};
pub use connection::{ConnectionId, HubConnection};
pub use listener::{ConnectionPolicy, Disposition, Listener, ListenerError, SwitchListener};
pub use replay::ReplayStream;
