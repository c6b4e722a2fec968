//! Route tags carried by the first line of every connection.

use std::fmt;

use crate::protocol::header::{Header, HEADER_LEN};

/// Prefix of a status-report connection.
pub const REPORT_TAG: &str = ">2";

/// Prefix of a binary session-protocol connection.
pub const SESSION_TAG: &str = "0";

/// Message code of the session-protocol "init session" frame.
pub const MSG_INIT_SESSION: u8 = 1;

/// Protocol selected for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteTag {
    /// Status-report sub-channel, handled by the handshake registry.
    Report,
    /// Binary interactive-shell session protocol.
    Session,
    /// Anything else is HTTP/WebDAV.
    Http,
}

impl RouteTag {
    pub fn from_first_line(line: &str) -> Self {
        if line.starts_with(REPORT_TAG) {
            RouteTag::Report
        } else if line.starts_with(SESSION_TAG) {
            RouteTag::Session
        } else {
            RouteTag::Http
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteTag::Report => "report",
            RouteTag::Session => "session",
            RouteTag::Http => "http",
        }
    }
}

impl fmt::Display for RouteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First line assumed for a connection that stays silent through the grace
/// period: an init-session frame header in hex.
pub fn default_first_line() -> String {
    let mut bytes = [0u8; HEADER_LEN];
    bytes[1] = MSG_INIT_SESSION;
    Header::from_bytes(bytes).to_string()
}
