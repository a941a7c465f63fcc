use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

use crate::errors::StreamDecodeWarning;

/// Result of waiting a bounded time for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// A complete line, trimmed. Undecodable lines come through empty.
    Line(String),
    /// Nothing complete arrived within the wait.
    Pending,
    /// End of stream and nothing left to hand out.
    Closed,
}

/// Line-oriented view of one child output stream that never blocks past the
/// wait it is given.
pub struct LineReader<R> {
    reader: BufReader<R>,
    partial: Vec<u8>,
    name: &'static str,
    closed: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(stream: R, name: &'static str) -> Self {
        Self {
            reader: BufReader::new(stream),
            partial: Vec::new(),
            name,
            closed: false,
        }
    }

    /// Wait at most `wait` for the next line.
    ///
    /// Bytes of a line that is still incomplete when the wait runs out are
    /// kept and completed by a later call. A trailing line without newline
    /// is returned once the stream closes.
    pub async fn poll_line(&mut self, wait: Duration) -> std::io::Result<Polled> {
        if self.closed {
            return Ok(Polled::Closed);
        }
        // read_until is cancel safe: on timeout the bytes read so far stay in
        // `partial`.
        match tokio::time::timeout(wait, self.reader.read_until(b'\n', &mut self.partial)).await {
            Err(_) => Ok(Polled::Pending),
            Ok(Err(e)) => Err(e),
            Ok(Ok(0)) => {
                self.closed = true;
                if self.partial.is_empty() {
                    Ok(Polled::Closed)
                } else {
                    Ok(Polled::Line(self.take_line()))
                }
            }
            Ok(Ok(_)) => Ok(Polled::Line(self.take_line())),
        }
    }

    /// Whether bytes have been received that were not handed out yet.
    pub fn has_pending(&self) -> bool {
        !self.partial.is_empty() || !self.reader.buffer().is_empty()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn take_line(&mut self) -> String {
        match String::from_utf8(std::mem::take(&mut self.partial)) {
            Ok(line) => line.trim().to_string(),
            Err(source) => {
                let warning = StreamDecodeWarning {
                    stream: self.name,
                    source,
                };
                warn!("{}", warning);
                String::new()
            }
        }
    }
}
