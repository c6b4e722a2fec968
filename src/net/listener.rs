//! TCP listener with backpressure and protocol switching.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Enforce max_connections via semaphore
//! - Classify every accepted connection concurrently
//! - Hand each classified connection to a [`ConnectionPolicy`]
//! - Surface the connections the policy keeps through the same accept
//!   contract as a plain listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};

use crate::config::ListenerConfig;
use crate::net::classifier::Classifier;
use crate::net::connection::HubConnection;
use crate::observability::metrics;

/// Pause after an accept error before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limiter was shut down.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Connection limiter closed"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;

        Ok(Self::from_tcp(listener, config.max_connections))
    }

    /// Wrap an already bound listener.
    pub fn from_tcp(inner: TcpListener, max_connections: usize) -> Self {
        if let Ok(local_addr) = inner.local_addr() {
            tracing::info!(
                address = %local_addr,
                max_connections,
                "Listener bound"
            );
        }

        Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// What a [`ConnectionPolicy`] did with a classified connection.
#[derive(Debug)]
pub enum Disposition {
    /// Return the connection to the caller of `accept`.
    Surface(HubConnection),
    /// The policy took ownership and dispatched the connection elsewhere.
    Dispatched,
}

/// Decides, from its first line, where a classified connection goes.
pub trait ConnectionPolicy: Send + Sync + 'static {
    fn route(&self, conn: HubConnection) -> Disposition;
}

/// Listener that classifies connections before surfacing them.
///
/// Classification of each connection runs in its own task; a slow or silent
/// peer never holds up the connections behind it.
pub struct SwitchListener {
    incoming: mpsc::Receiver<HubConnection>,
    local_addr: SocketAddr,
}

impl SwitchListener {
    /// Start the accept loop. It stops when `shutdown` fires.
    pub fn spawn(
        listener: Listener,
        classifier: Classifier,
        policy: Arc<dyn ConnectionPolicy>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let (tx, rx) = mpsc::channel(listener.max_connections().clamp(1, 1024));

        tokio::spawn(accept_loop(listener, classifier, policy, tx, shutdown));

        Ok(Self {
            incoming: rx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next connection the policy surfaced.
    ///
    /// Returns `None` once the accept loop has stopped and every in-flight
    /// classification has finished.
    pub async fn next(&mut self) -> Option<HubConnection> {
        self.incoming.recv().await
    }
}

impl axum::serve::Listener for SwitchListener {
    type Io = HubConnection;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.next().await {
            Some(conn) => {
                let addr = conn.peer_addr();
                (conn, addr)
            }
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

async fn accept_loop(
    listener: Listener,
    classifier: Classifier,
    policy: Arc<dyn ConnectionPolicy>,
    tx: mpsc::Sender<HubConnection>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = shutdown.recv() => {
                tracing::info!("Accept loop stopping");
                break;
            }
        };

        match accepted {
            Ok((stream, peer_addr, permit)) => {
                let classifier = classifier.clone();
                let policy = Arc::clone(&policy);
                let tx = tx.clone();
                tokio::spawn(async move {
                    classify_connection(classifier, policy, tx, stream, peer_addr, permit).await;
                });
            }
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn classify_connection(
    classifier: Classifier,
    policy: Arc<dyn ConnectionPolicy>,
    tx: mpsc::Sender<HubConnection>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    permit: ConnectionPermit,
) {
    let classified = match classifier.classify(stream).await {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(
                peer_addr = %peer_addr,
                error = %e,
                "Classification failed, dropping connection"
            );
            return;
        }
    };

    if classified.timed_out {
        metrics::record_classification_timeout();
    }

    let conn = HubConnection::new(peer_addr, classified, permit);
    tracing::debug!(
        connection_id = %conn.id(),
        peer_addr = %peer_addr,
        first_line = %conn.first_line(),
        timed_out = conn.timed_out(),
        "Connection classified"
    );

    if let Disposition::Surface(conn) = policy.route(conn) {
        if tx.send(conn).await.is_err() {
            tracing::debug!(peer_addr = %peer_addr, "Listener gone, dropping connection");
        }
    }
}
