//! Per-connection protocol sniffing.
//!
//! # Responsibilities
//! - Read the first line of a fresh connection within a grace period
//! - Fall back to the session-protocol default when the peer stays silent
//! - Hand back a stream that replays every byte consumed while sniffing
//!
//! # Design Decisions
//! - Pure elapsed-time race: a line arriving after the deadline loses even if
//!   it is a valid banner
//! - The losing detector is cancelled, so nothing keeps reading the socket
//!   behind the consumer's back
//! - `read_until` appends to a buffer owned outside the race, so bytes already
//!   read when the timer wins are kept for replay

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::config::ClassifierConfig;
use crate::net::replay::ReplayStream;
use crate::protocol::default_first_line;

/// Outcome of classifying one connection.
#[derive(Debug)]
pub struct Classified<S> {
    /// First line without its line terminator, or the synthetic default.
    pub first_line: String,
    /// True when the grace period elapsed before a full line arrived.
    pub timed_out: bool,
    /// The original byte stream, including bytes read while sniffing.
    pub stream: ReplayStream<BufReader<S>>,
}

/// Races a first-line reader against a grace-period timer.
#[derive(Debug, Clone)]
pub struct Classifier {
    grace_period: Duration,
    max_line_bytes: usize,
}

impl Classifier {
    pub fn new(grace_period: Duration, max_line_bytes: usize) -> Self {
        Self {
            grace_period,
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            Duration::from_millis(config.grace_period_ms),
            config.max_first_line_bytes,
        )
    }

    /// Classify `stream`.
    ///
    /// A read error, or end of stream before any byte, fails the
    /// classification; the caller drops the connection.
    pub async fn classify<S>(&self, stream: S) -> io::Result<Classified<S>>
    where
        S: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut consumed = Vec::new();

        let read = {
            let mut limited = (&mut reader).take(self.max_line_bytes as u64);
            tokio::select! {
                res = limited.read_until(b'\n', &mut consumed) => Some(res),
                _ = tokio::time::sleep(self.grace_period) => None,
            }
        };

        let timed_out = read.is_none();
        let first_line = match read {
            Some(Ok(0)) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before first line",
                ))
            }
            Some(Ok(_)) => line_text(&consumed),
            Some(Err(e)) => return Err(e),
            None => default_first_line(),
        };

        Ok(Classified {
            first_line,
            timed_out,
            stream: ReplayStream::new(consumed, reader),
        })
    }
}

fn line_text(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
