//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the hub.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::dav::DEFAULT_HOST_PATTERN;

/// Port the hub listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 4349;

/// Link template used for welcome and edit links.
pub const DEFAULT_LINK_TEMPLATE: &str = "webdav://{host}.lo.localhost:{port}{path}";

/// Root configuration for the hub.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HubConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// First-line classification settings.
    pub classifier: ClassifierConfig,

    /// Report handshake settings.
    pub handshake: HandshakeConfig,

    /// WebDAV session naming and links.
    pub sessions: SessionsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:4349").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("127.0.0.1:{DEFAULT_PORT}"),
            max_connections: 1024,
        }
    }
}

/// Connection classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// How long a silent connection is given before it is assumed to speak
    /// the session protocol, in milliseconds.
    pub grace_period_ms: u64,

    /// Longest first line read while classifying.
    pub max_first_line_bytes: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
            max_first_line_bytes: 4096,
        }
    }
}

/// Report handshake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// How long a leader waits for its report connection, in seconds.
    pub timeout_secs: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

/// WebDAV session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Regex whose first capture group extracts the logical host.
    pub host_pattern: String,

    /// Template of the link printed when a session opens.
    /// Placeholders: `{host}`, `{port}`, `{path}`.
    pub welcome_link: String,

    /// Template of the links printed per requested edit target.
    pub edit_link: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            host_pattern: DEFAULT_HOST_PATTERN.to_string(),
            welcome_link: DEFAULT_LINK_TEMPLATE.to_string(),
            edit_link: DEFAULT_LINK_TEMPLATE.to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9349".to_string(),
        }
    }
}
