//! Logical host extraction.
//!
//! One capturing-group regex maps a declared host (an HTTP `Host` header or
//! the host of a reported URL) to the logical host a session is registered
//! under. The same pattern is shared by the dispatcher and the handshake
//! payload parser.

use regex::Regex;
use thiserror::Error;
use url::Url;

/// Default pattern: everything before the first `.lo` label.
pub const DEFAULT_HOST_PATTERN: &str = r"^(.+?)\.lo\b";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostMatchError {
    #[error("match host failed: {0:?}")]
    NoMatch(String),

    #[error("invalid host pattern: {0}")]
    InvalidPattern(String),

    #[error("host pattern {0:?} has no capture group")]
    NoCaptureGroup(String),
}

#[derive(Debug, Clone)]
pub struct HostPattern {
    regex: Regex,
}

impl HostPattern {
    pub fn new(pattern: &str) -> Result<Self, HostMatchError> {
        let regex = Regex::new(pattern).map_err(|e| HostMatchError::InvalidPattern(e.to_string()))?;
        if regex.captures_len() < 2 {
            return Err(HostMatchError::NoCaptureGroup(pattern.to_string()));
        }
        Ok(Self { regex })
    }

    /// Logical host captured by the first group.
    pub fn extract(&self, declared: &str) -> Result<String, HostMatchError> {
        self.regex
            .captures(declared)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| HostMatchError::NoMatch(declared.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Host of `url` as a client would declare it, with the port when present.
pub fn declared_host(url: &Url) -> Option<String> {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => Some(format!("{host}:{port}")),
        (Some(host), None) => Some(host.to_string()),
        (None, _) => None,
    }
}

impl Default for HostPattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_HOST_PATTERN).expect("default host pattern is valid"),
        }
    }
}
