//! Classified connection handle.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Carry the replayed byte stream of a classified connection and the
//!   outcome of its classification
//! - Hold the listener permit for the connection's lifetime

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;

use crate::net::classifier::Classified;
use crate::net::listener::ConnectionPermit;
use crate::net::replay::ReplayStream;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted, classified TCP connection.
///
/// Reads replay the bytes consumed during classification first. Dropping the
/// connection closes the socket and releases its listener slot.
#[derive(Debug)]
pub struct HubConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    first_line: String,
    timed_out: bool,
    stream: ReplayStream<BufReader<TcpStream>>,
    _permit: ConnectionPermit,
}

impl HubConnection {
    pub fn new(
        peer_addr: SocketAddr,
        classified: Classified<TcpStream>,
        permit: ConnectionPermit,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            peer_addr,
            first_line: classified.first_line,
            timed_out: classified.timed_out,
            stream: classified.stream,
            _permit: permit,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// First line the connection was routed by.
    ///
    /// For a peer that stayed silent through the grace period this is the
    /// init-session default, which never went over the wire.
    pub fn first_line(&self) -> &str {
        &self.first_line
    }

    /// Whether the grace period ran out before a full first line arrived.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

impl AsyncRead for HubConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for HubConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
