//! Startup checks.
//!
//! # Responsibilities
//! - Detect a hub already serving the configured address
//!
//! # Design Decisions
//! - A hub of the same version already running means there is nothing to
//!   do; the caller exits successfully instead of failing to bind
//! - A different version, or anything else answering, is only logged and
//!   the bind attempt decides what happens next

use std::time::Duration;

use thiserror::Error;

use crate::http::{hub_version, VERSION_PATH};

/// How long the running-instance probe may take.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("version is different. running is {running}, want {wanted}")]
    VersionMismatch { running: String, wanted: String },
}

/// Ask whatever listens on `addr` for its version.
///
/// `Ok` means a hub of this exact version is already running there.
pub async fn probe_running(addr: &str) -> Result<(), ProbeError> {
    let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
    let running = client
        .get(format!("http://{addr}{VERSION_PATH}"))
        .send()
        .await?
        .text()
        .await?;

    let wanted = hub_version();
    if running != wanted {
        return Err(ProbeError::VersionMismatch { running, wanted });
    }

    tracing::info!(address = %addr, version = %running, "Hub already running");
    Ok(())
}
