//! Hub assembly.
//!
//! # Responsibilities
//! - Own the handshake registry, session directory and supervisor
//! - Route classified connections by their first line
//! - Run the switch listener and the HTTP server together
//!
//! # Data Flow
//! ```text
//! first line ">2..."  → HandshakeRegistry::handle_report (own task)
//! first line "0..."   → SessionServer::serve (own task)
//! anything else       → surfaced to the HTTP server
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::config::HubConfig;
use crate::dav::{DavHandlerFactory, HostMatchError, HostPattern, SessionDirectory};
use crate::handshake::HandshakeRegistry;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{
    Classifier, ConnectionPolicy, Disposition, HubConnection, Listener, ListenerError,
    SwitchListener,
};
use crate::observability::metrics;
use crate::protocol::RouteTag;
use crate::session::{DetachedSessionServer, SessionServer, SessionSupervisor, SupervisorSettings};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("invalid host pattern: {0}")]
    HostPattern(#[from] HostMatchError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("HTTP server: {0}")]
    Http(#[from] std::io::Error),
}

/// Shared state behind one listening port.
pub struct Hub {
    registry: Arc<HandshakeRegistry>,
    directory: Arc<SessionDirectory>,
    supervisor: Arc<SessionSupervisor>,
    session_server: Arc<dyn SessionServer>,
}

impl Hub {
    /// Build a hub for `config` whose links advertise `port`.
    ///
    /// Session-protocol connections are closed until a server is attached
    /// with [`Hub::with_session_server`].
    pub fn new(
        config: &HubConfig,
        port: u16,
        dav_factory: Arc<dyn DavHandlerFactory>,
    ) -> Result<Self, HubError> {
        let host_pattern = HostPattern::new(&config.sessions.host_pattern)?;
        let registry = Arc::new(HandshakeRegistry::new(host_pattern.clone()));
        let directory = Arc::new(SessionDirectory::new(host_pattern, dav_factory));
        let supervisor = Arc::new(SessionSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            SupervisorSettings::from_config(config, port),
        ));

        Ok(Self {
            registry,
            directory,
            supervisor,
            session_server: Arc::new(DetachedSessionServer),
        })
    }

    /// Serve session-protocol connections with `server`.
    ///
    /// The server is expected to call [`SessionSupervisor::open`] for every
    /// shell it opens and keep the returned guard for the shell's lifetime.
    pub fn with_session_server(mut self, server: Arc<dyn SessionServer>) -> Self {
        self.session_server = server;
        self
    }

    pub fn registry(&self) -> &Arc<HandshakeRegistry> {
        &self.registry
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn supervisor(&self) -> &Arc<SessionSupervisor> {
        &self.supervisor
    }

    /// Accept on `listener` until `shutdown` fires.
    pub async fn serve(
        self: Arc<Self>,
        listener: Listener,
        classifier: Classifier,
        shutdown: &Shutdown,
    ) -> Result<(), HubError> {
        let directory = Arc::clone(&self.directory);
        let switch = SwitchListener::spawn(listener, classifier, self, shutdown.subscribe())?;
        HttpServer::new(directory)
            .run(switch, shutdown.subscribe())
            .await?;
        Ok(())
    }
}

impl ConnectionPolicy for Hub {
    fn route(&self, conn: HubConnection) -> Disposition {
        let route = RouteTag::from_first_line(conn.first_line());
        metrics::record_connection(route.as_str());
        tracing::debug!(connection_id = %conn.id(), route = %route, "Routing connection");

        match route {
            RouteTag::Report => {
                let registry = Arc::clone(&self.registry);
                tokio::spawn(async move {
                    let id = conn.id();
                    let peer_addr = conn.peer_addr();
                    registry.handle_report(conn, id, Some(peer_addr)).await;
                });
                Disposition::Dispatched
            }
            RouteTag::Session => {
                tokio::spawn(self.session_server.serve(conn));
                Disposition::Dispatched
            }
            RouteTag::Http => Disposition::Surface(conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dav::directory::tests::echo_factory;

    #[test]
    fn test_rejects_pattern_without_group() {
        let mut config = HubConfig::default();
        config.sessions.host_pattern = r"^.+\.lo".into();
        assert!(matches!(
            Hub::new(&config, 4349, echo_factory()),
            Err(HubError::HostPattern(HostMatchError::NoCaptureGroup(_)))
        ));
    }

    #[test]
    fn test_shares_host_pattern() {
        let mut config = HubConfig::default();
        config.sessions.host_pattern = r"^(.+)\.dev".into();
        let hub = Hub::new(&config, 4349, echo_factory()).unwrap();
        assert_eq!(hub.registry().host_pattern().as_str(), r"^(.+)\.dev");
        assert_eq!(hub.directory().host_pattern().as_str(), r"^(.+)\.dev");
        assert_eq!(hub.supervisor().settings().port, 4349);
    }
}
