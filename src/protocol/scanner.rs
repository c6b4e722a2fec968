//! Sentinel-delimited line scanner.
//!
//! Status lines are interleaved with terminal echo on the report channel. The
//! scanner slides a window the size of the sentinel over every newline or
//! printable byte and, once the window equals the sentinel, collects the rest
//! of the line.
//!
//! The scan state lives in the scanner, not in the future returned by
//! [`LineScanner::next_line`], so a call dropped inside `select!` loses no
//! bytes and the next call picks up where it stopped.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Sentinel preceding every status line on the report channel.
pub const STATUS_SENTINEL: &[u8] = b"\n>2: ";

/// Restartable scanner that yields the line following each sentinel.
#[derive(Debug)]
pub struct LineScanner<R> {
    reader: R,
    sentinel: Vec<u8>,
    window: Vec<u8>,
    accumulating: bool,
    line: Vec<u8>,
}

impl<R> LineScanner<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Scanner for the default [`STATUS_SENTINEL`].
    pub fn new(reader: R) -> Self {
        Self::with_sentinel(reader, STATUS_SENTINEL)
    }

    pub fn with_sentinel(reader: R, sentinel: &[u8]) -> Self {
        Self {
            reader,
            sentinel: sentinel.to_vec(),
            window: vec![0; sentinel.len()],
            accumulating: false,
            line: Vec::new(),
        }
    }

    /// Read up to and including the next sentinel-delimited line.
    ///
    /// Returns the line without its trailing newline. End of stream is
    /// reported as [`io::ErrorKind::UnexpectedEof`], whatever the scan phase.
    pub async fn next_line(&mut self) -> io::Result<Vec<u8>> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "status stream ended",
                ));
            }

            let mut consumed = 0;
            let mut complete = false;
            for &byte in buf {
                consumed += 1;
                if self.accumulating {
                    if byte == b'\n' {
                        push(&mut self.window, byte);
                        self.accumulating = false;
                        complete = true;
                        break;
                    }
                    self.line.push(byte);
                    continue;
                }

                if byte != b'\n' && !is_printable(byte) {
                    continue;
                }
                push(&mut self.window, byte);
                if self.window == self.sentinel {
                    self.accumulating = true;
                }
            }
            self.reader.consume(consumed);

            if complete {
                return Ok(std::mem::take(&mut self.line));
            }
        }
    }
}

fn push(window: &mut [u8], byte: u8) {
    if let Some(last) = window.len().checked_sub(1) {
        window.rotate_left(1);
        window[last] = byte;
    }
}

/// Printable in the Latin-1 sense: ASCII graphic or space, or a byte above
/// the C1 control range other than the soft hyphen.
fn is_printable(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7e | 0xa0..=0xac | 0xae..=0xff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_reads_lines_then_eof() {
        let input: &[u8] = b"\n>2: abc\n>2: def\nxyz";
        let mut scanner = LineScanner::new(input);

        assert_eq!(scanner.next_line().await.unwrap(), b"abc");
        assert_eq!(scanner.next_line().await.unwrap(), b"def");
        let err = scanner.next_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_control_bytes_do_not_leak_or_break_matching() {
        let input: &[u8] = b"echo\x1b[0m noise\x00\n>\x072: one\n\x01\x02junk\x7f\n\x1b>2: two\n";
        let mut scanner = LineScanner::new(input);

        assert_eq!(scanner.next_line().await.unwrap(), b"one");
        assert_eq!(scanner.next_line().await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_soft_hyphen_is_not_printable() {
        let input: &[u8] = b"\n>\xad2: one\n";
        let mut scanner = LineScanner::new(input);
        assert_eq!(scanner.next_line().await.unwrap(), b"one");

        assert!(is_printable(0xa0));
        assert!(!is_printable(0xad));
        assert!(is_printable(0xae));
    }

    #[tokio::test]
    async fn test_match_is_case_sensitive_and_exact() {
        let input: &[u8] = b"\n>3: nope\n>2:nope\n>2: yes\n";
        let mut scanner = LineScanner::new(input);

        assert_eq!(scanner.next_line().await.unwrap(), b"yes");
    }

    #[tokio::test]
    async fn test_sentinel_must_start_after_newline() {
        let input: &[u8] = b"prompt>2: hidden\n>2: shown\n";
        let mut scanner = LineScanner::new(input);

        assert_eq!(scanner.next_line().await.unwrap(), b"shown");
    }

    #[tokio::test]
    async fn test_state_survives_split_reads() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut scanner = LineScanner::new(BufReader::new(rx));

        let writer = tokio::spawn(async move {
            for chunk in [&b"\n>"[..], b"2", b": par", b"tial\n>2: ", b"next\n"] {
                tx.write_all(chunk).await.unwrap();
                tx.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        assert_eq!(scanner.next_line().await.unwrap(), b"partial");
        assert_eq!(scanner.next_line().await.unwrap(), b"next");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_call_resumes() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut scanner = LineScanner::new(BufReader::new(rx));

        tx.write_all(b"\n>2: hal").await.unwrap();
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            scanner.next_line(),
        )
        .await;
        assert!(timed_out.is_err());

        tx.write_all(b"f\n").await.unwrap();
        assert_eq!(scanner.next_line().await.unwrap(), b"half");
    }

    #[tokio::test]
    async fn test_custom_sentinel() {
        let input: &[u8] = b"xx##val\n";
        let mut scanner = LineScanner::with_sentinel(input, b"##");
        assert_eq!(scanner.next_line().await.unwrap(), b"val");
    }
}
