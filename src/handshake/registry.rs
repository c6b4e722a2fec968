//! Correlation handler registry.
//!
//! # Responsibilities
//! - Allocate a slot ID and random magic code per leader session
//! - Validate an incoming report header against its slot
//! - Deliver the report descriptor to the waiting leader exactly once
//!
//! # Design Decisions
//! - A slot is removed on delivery; a slot whose handler has gone away stays
//!   until its report arrives or allocation reuses the ID
//! - Validation and removal happen in one write-locked section, so two
//!   reports racing on the same header cannot both succeed
//! - No retries: every failure is terminal for the report connection

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::dav::host::{HostMatchError, HostPattern};
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::protocol::header::{Header, HeaderError};

/// Errors raised while correlating a report with its leader.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handler not found")]
    NotFound(u32),

    #[error("handler is reused")]
    Reused(u32),

    #[error("handler abandoned by its leader")]
    Abandoned(u32),

    #[error("invalid report header: {0}")]
    Header(#[from] HeaderError),

    #[error("invalid report payload: {0}")]
    Payload(String),

    #[error("report host: {0}")]
    Host(#[from] HostMatchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HandshakeError {
    fn outcome(&self) -> &'static str {
        match self {
            HandshakeError::NotFound(_) => "not_found",
            HandshakeError::Reused(_) => "reused",
            HandshakeError::Abandoned(_) => "abandoned",
            _ => "rejected",
        }
    }
}

/// What a report connection tells its leader.
#[derive(Debug)]
pub struct ReportDescriptor {
    pub connection: ConnectionId,
    pub peer_addr: Option<SocketAddr>,
    pub host: String,
    pub workdir: String,
    closed: Option<oneshot::Receiver<()>>,
}

impl ReportDescriptor {
    pub(crate) fn new(
        connection: ConnectionId,
        peer_addr: Option<SocketAddr>,
        host: String,
        workdir: String,
        closed: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            connection,
            peer_addr,
            host,
            workdir,
            closed: Some(closed),
        }
    }

    /// Wait until the report connection has closed.
    pub async fn closed(&mut self) {
        if let Some(rx) = self.closed.take() {
            // Sender dropped and sender fired both mean closed.
            let _ = rx.await;
        }
    }
}

/// Server-side record awaiting exactly one correlated report.
#[derive(Debug)]
pub struct Handler {
    header: Header,
    rx: oneshot::Receiver<ReportDescriptor>,
}

impl Handler {
    pub fn header(&self) -> Header {
        self.header
    }

    /// Wait for the report. Fails once the registry can no longer deliver.
    pub async fn recv(self) -> Result<ReportDescriptor, HandshakeError> {
        let id = self.header.id();
        self.rx.await.map_err(|_| HandshakeError::Abandoned(id))
    }
}

#[derive(Debug)]
struct Slot {
    magic: u32,
    tx: oneshot::Sender<ReportDescriptor>,
}

impl Slot {
    /// Still held by a handler that can take a report.
    fn is_waiting(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: HashMap<u32, Slot>,
    next_id: u32,
}

/// Allocates handlers and fulfils each one at most once.
#[derive(Debug)]
pub struct HandshakeRegistry {
    host_pattern: HostPattern,
    state: RwLock<RegistryState>,
}

impl HandshakeRegistry {
    pub fn new(host_pattern: HostPattern) -> Self {
        Self {
            host_pattern,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn host_pattern(&self) -> &HostPattern {
        &self.host_pattern
    }

    /// Allocate a handler on the first unoccupied ID at or above the counter.
    ///
    /// A slot whose handler was dropped counts as unoccupied.
    pub fn new_handler(&self) -> Handler {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let id = loop {
            let id = state.next_id;
            state.next_id = id.wrapping_add(1);
            if !state.slots.get(&id).is_some_and(Slot::is_waiting) {
                break id;
            }
        };

        let header = Header::encode(id, 0);
        state.slots.insert(
            id,
            Slot {
                magic: header.magic_code(),
                tx,
            },
        );

        Handler { header, rx }
    }

    /// Hand `descriptor` to the handler identified by `header`.
    pub fn correlate(
        &self,
        header: Header,
        descriptor: ReportDescriptor,
    ) -> Result<(), HandshakeError> {
        let result = self.take_sender(header).and_then(|tx| {
            tx.send(descriptor)
                .map_err(|_| HandshakeError::Abandoned(header.id()))
        });

        match &result {
            Ok(()) => {
                metrics::record_handshake("delivered");
                tracing::info!(header = %header, "Report correlated with leader");
            }
            Err(e) => {
                metrics::record_handshake(e.outcome());
                tracing::warn!(header = %header, error = %e, "Report correlation failed");
            }
        }
        result
    }

    fn take_sender(
        &self,
        header: Header,
    ) -> Result<oneshot::Sender<ReportDescriptor>, HandshakeError> {
        let id = header.id();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match state.slots.get(&id) {
            None => Err(HandshakeError::NotFound(id)),
            Some(slot) if slot.magic != header.magic_code() => Err(HandshakeError::Reused(id)),
            Some(_) => state
                .slots
                .remove(&id)
                .map(|slot| slot.tx)
                .ok_or(HandshakeError::NotFound(id)),
        }
    }

    /// Number of handlers still waiting for a report.
    pub fn pending_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.slots.values().filter(|slot| slot.is_waiting()).count()
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.state.read().unwrap().slots.len()
    }

    #[cfg(test)]
    fn set_next_id(&self, id: u32) {
        self.state.write().unwrap().next_id = id;
    }
}

impl Default for HandshakeRegistry {
    fn default() -> Self {
        Self::new(HostPattern::default())
    }
}
