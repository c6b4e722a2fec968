//! Status-report connections.
//!
//! A report connection carries the stderr of a child shell spawned by a
//! leader. Its first status line is the correlation header; every following
//! status line is echoed back with non-graphic characters removed, and the
//! first of them names the host and working directory being served.

use std::net::SocketAddr;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use url::Url;

use crate::dav::declared_host;
use crate::handshake::registry::{HandshakeError, HandshakeRegistry, ReportDescriptor};
use crate::net::ConnectionId;
use crate::protocol::{Header, LineScanner};

/// Characters skipped before the reported URL on the first content line.
pub const REPORT_PAYLOAD_OFFSET: usize = 4;

impl HandshakeRegistry {
    /// Serve one report connection until it ends or fails.
    ///
    /// Any failure closes the connection; dropping it fires the closed
    /// signal held by the leader, if one was correlated. A report whose leader
    /// has already given up keeps echoing until the peer goes away.
    pub async fn handle_report<S>(
        &self,
        stream: S,
        connection: ConnectionId,
        peer_addr: Option<SocketAddr>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.serve_report(stream, connection, peer_addr).await {
            Err(HandshakeError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!(connection_id = %connection, "Report connection ended");
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection,
                    error = %e,
                    "Report connection rejected"
                );
            }
            Ok(()) => {}
        }
    }

    async fn serve_report<S>(
        &self,
        stream: S,
        connection: ConnectionId,
        peer_addr: Option<SocketAddr>,
    ) -> Result<(), HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // Dropped on return, which is what the leader waits for.
        let (_closed_tx, closed_rx) = oneshot::channel::<()>();
        let mut closed_rx = Some(closed_rx);

        let (read_half, mut write_half) = tokio::io::split(stream);
        // The header line is the very first thing on the wire, so give the
        // sentinel the newline it needs to match.
        let mut scanner = LineScanner::new(BufReader::new((&b"\n"[..]).chain(read_half)));

        let header_line = scanner.next_line().await?;
        let header = Header::parse_hex(&String::from_utf8_lossy(&header_line))?;
        tracing::debug!(connection_id = %connection, header = %header, "Report connection opened");

        loop {
            let raw = scanner.next_line().await?;
            let line = printable_text(&raw);

            write_half.write_all(line.as_bytes()).await?;
            write_half.write_all(b"\n").await?;

            if let Some(closed) = closed_rx.take() {
                let (host, workdir) = self.parse_report_link(&line)?;
                tracing::debug!(
                    connection_id = %connection,
                    host = %host,
                    workdir = %workdir,
                    "Report names working directory"
                );
                let descriptor =
                    ReportDescriptor::new(connection, peer_addr, host, workdir, closed);
                match self.correlate(header, descriptor) {
                    Ok(()) => {}
                    // A leader that timed out does not take the report channel down.
                    Err(HandshakeError::Abandoned(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

    /// Logical host and working directory named by a report line.
    pub fn parse_report_link(&self, line: &str) -> Result<(String, String), HandshakeError> {
        let link = line
            .get(REPORT_PAYLOAD_OFFSET..)
            .ok_or_else(|| HandshakeError::Payload(format!("line too short: {line:?}")))?;
        let url = Url::parse(link).map_err(|e| HandshakeError::Payload(format!("{e}: {link:?}")))?;

        let declared = declared_host(&url)
            .ok_or_else(|| HandshakeError::Payload(format!("no host in {link:?}")))?;
        let host = self.host_pattern().extract(&declared)?;
        let workdir = percent_decode_str(url.path()).decode_utf8_lossy().into_owned();

        Ok((host, workdir))
    }
}

/// Everything that is not a graphic character: control, format, private
/// use, unassigned, and line or paragraph separators.
static NON_GRAPHIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{C}\p{Zl}\p{Zp}]").expect("non-graphic class is valid")
});

/// Line as text with non-graphic characters removed.
pub(crate) fn printable_text(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    NON_GRAPHIC.replace_all(&text, "").into_owned()
}
