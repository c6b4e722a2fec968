//! Contracts for the remote-shell collaborators.
//!
//! The binary session protocol and the shell it drives live outside this
//! crate. The hub only needs to run commands, write raw lines, close a shell,
//! and hand session-protocol connections to whatever serves them.

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::net::HubConnection;

/// A live remote shell session.
pub trait RemoteShell: Send + Sync + 'static {
    /// Run `command` and return what it wrote to stdout.
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, io::Result<String>>;

    /// Write `line` followed by a newline straight to the shell's input.
    fn send_line<'a>(&'a self, line: &'a str) -> BoxFuture<'a, io::Result<()>>;

    /// Close the session. Closing twice is a no-op.
    fn close(&self);
}

/// Serves connections tagged for the binary session protocol.
pub trait SessionServer: Send + Sync + 'static {
    fn serve(&self, conn: HubConnection) -> BoxFuture<'static, ()>;
}

/// Session server used when no session-protocol engine is linked in.
///
/// Every connection is logged and closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedSessionServer;

impl SessionServer for DetachedSessionServer {
    fn serve(&self, conn: HubConnection) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tracing::warn!(
                connection_id = %conn.id(),
                peer_addr = %conn.peer_addr(),
                "No session-protocol server attached, closing connection"
            );
        })
    }
}

impl<T: SessionServer + ?Sized> SessionServer for Arc<T> {
    fn serve(&self, conn: HubConnection) -> BoxFuture<'static, ()> {
        (**self).serve(conn)
    }
}
