//! Asynchronous line reader
//!
//! A background task drains a byte stream, accumulates bytes until `\n`, and
//! hands each completed line to a `LineHandler`. Arrival of bytes is thus
//! decoupled from whoever is waiting for a response.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

/// Longest line accepted by default; a full collection fits comfortably.
pub const MAX_LINE: usize = 16 * 1024 * 1024;

/// Notified once per completed line (terminator and trailing `\r` removed).
pub trait LineHandler: Send + 'static {
    fn line_read(&mut self, line: String);
}

impl<F> LineHandler for F
where
    F: FnMut(String) + Send + 'static,
{
    fn line_read(&mut self, line: String) {
        self(line)
    }
}

/// Why the reader stopped.
#[derive(Debug)]
pub enum ReadEnd {
    /// The peer closed the stream
    Closed,
    /// The owner cancelled the reader
    Cancelled,
    Failed(std::io::Error),
}

pub struct AsyncLineReader<R> {
    source: R,
    pending: Vec<u8>,
    max_line: usize,
    /// Dropping bytes until the end of an oversized line
    overflowed: bool,
}

impl<R> AsyncLineReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(source: R) -> Self {
        Self {
            source,
            pending: Vec::new(),
            max_line: MAX_LINE,
            overflowed: false,
        }
    }

    /// Lines longer than `max_line` bytes are dropped whole.
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    /// Read until the stream ends, the read fails, or `cancel` fires.
    ///
    /// A partial line left when the stream closes is discarded.
    pub async fn run<H: LineHandler>(mut self, mut handler: H, cancel: CancellationToken) -> ReadEnd {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return ReadEnd::Cancelled,
                read = self.source.read(&mut chunk) => read,
            };
            match read {
                Ok(0) => {
                    if !self.pending.is_empty() {
                        debug!(bytes = self.pending.len(), "Discarding unterminated line at end of stream");
                    }
                    return ReadEnd::Closed;
                }
                Ok(n) => self.accept(&chunk[..n], &mut handler),
                Err(e) => {
                    warn!(error = %e, "Line reader failed");
                    return ReadEnd::Failed(e);
                }
            }
        }
    }

    /// Run on the current runtime. Dropping the handle stops the reader.
    pub fn spawn<H: LineHandler>(self, handler: H, cancel: CancellationToken) -> AbortOnDropHandle<ReadEnd> {
        AbortOnDropHandle::new(tokio::spawn(self.run(handler, cancel)))
    }

    fn accept<H: LineHandler>(&mut self, bytes: &[u8], handler: &mut H) {
        for &byte in bytes {
            if byte == b'\n' {
                if std::mem::take(&mut self.overflowed) {
                    continue;
                }
                let mut line = std::mem::take(&mut self.pending);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                handler.line_read(String::from_utf8_lossy(&line).into_owned());
            } else if self.overflowed {
                continue;
            } else if self.pending.len() >= self.max_line {
                warn!(max_line = self.max_line, "Dropping oversized line");
                self.pending.clear();
                self.overflowed = true;
            } else {
                self.pending.push(byte);
            }
        }
    }
}
