//! lcode-hub: one TCP port for remote shells, their status reports and the
//! WebDAV sessions they expose.

pub mod config;
pub mod dav;
pub mod handshake;
pub mod http;
pub mod hub;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod session;

pub use config::HubConfig;
pub use http::HttpServer;
pub use hub::{Hub, HubError};
pub use lifecycle::Shutdown;
