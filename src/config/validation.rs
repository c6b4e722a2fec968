//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (durations > 0, limits > 0)
//! - Check that addresses parse and the host pattern compiles
//! - Check that link templates carry the placeholders sessions need, and
//!   that the host of a rendered link maps back to the session's host
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HubConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{HubConfig, DEFAULT_PORT};
use crate::dav::{declared_host, HostPattern};
use crate::session::render_link;

/// Logical host used to check that links route back to their session.
const SAMPLE_HOST: &str = "devbox";

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &HubConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.classifier.grace_period_ms == 0 {
        errors.push(ValidationError::new("classifier.grace_period_ms", "must be greater than 0"));
    }
    if config.classifier.max_first_line_bytes == 0 {
        errors.push(ValidationError::new(
            "classifier.max_first_line_bytes",
            "must be greater than 0",
        ));
    }

    if config.handshake.timeout_secs == 0 {
        errors.push(ValidationError::new("handshake.timeout_secs", "must be greater than 0"));
    }

    let host_pattern = match HostPattern::new(&config.sessions.host_pattern) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            errors.push(ValidationError::new("sessions.host_pattern", e.to_string()));
            None
        }
    };
    for (field, template) in [
        ("sessions.welcome_link", &config.sessions.welcome_link),
        ("sessions.edit_link", &config.sessions.edit_link),
    ] {
        let missing: Vec<&str> = ["{host}", "{path}"]
            .into_iter()
            .filter(|placeholder| !template.contains(*placeholder))
            .collect();
        for placeholder in &missing {
            errors.push(ValidationError::new(field, format!("missing {placeholder} placeholder")));
        }
        if !missing.is_empty() {
            continue;
        }
        if let Some(pattern) = &host_pattern {
            if let Err(message) = check_link_host(pattern, template) {
                errors.push(ValidationError::new(field, message));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Render `template` for a sample session and check that its host extracts
/// back to the sample host.
fn check_link_host(pattern: &HostPattern, template: &str) -> Result<(), String> {
    let link = render_link(template, SAMPLE_HOST, DEFAULT_PORT, "/");
    let url = Url::parse(&link).map_err(|e| format!("renders invalid URL {link:?}: {e}"))?;
    let declared = declared_host(&url).ok_or_else(|| format!("no host in {link:?}"))?;
    match pattern.extract(&declared) {
        Ok(host) if host == SAMPLE_HOST => Ok(()),
        Ok(host) => Err(format!("host {declared:?} maps to {host:?}, expected {SAMPLE_HOST:?}")),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&HubConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = HubConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.classifier.grace_period_ms = 0;
        config.sessions.host_pattern = r"^.+\.lo".into();
        config.sessions.edit_link = "webdav://{host}".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "classifier.grace_period_ms",
                "sessions.host_pattern",
                "sessions.edit_link",
            ]
        );
    }

    #[test]
    fn test_link_host_must_map_back() {
        let mut config = HubConfig::default();
        // Greedy: "devbox.lo.localhost" would map to "devbox.lo".
        config.sessions.host_pattern = r"^(.+)\.lo".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["sessions.welcome_link", "sessions.edit_link"]);
        assert!(errors[0].message.contains("\"devbox.lo\""), "{}", errors[0]);

        config.sessions.host_pattern = r"^(.+)\.lo\.localhost".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = HubConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
