//! Readers for the child's output streams.
//!
//! stdout is consumed line by line by [`LineScanner`]. stderr is consumed by
//! [`BlockReader`], which joins reads that follow each other within a short
//! settle window so that a multi-line stack trace arrives as one message, even
//! when the child writes it frame by frame.

use std::fmt;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use super::StreamReadError;

/// Size of the buffer handed to each stderr read.
pub const BLOCK_READ_CHUNK: usize = 64 * 1024;

/// Upper bound of one joined stderr block. Larger output is split.
pub const MAX_BLOCK_BYTES: usize = 1024 * 1024;

/// Default quiet period that ends a stderr block.
pub const DEFAULT_DIAGNOSTIC_SETTLE: Duration = Duration::from_millis(50);

/// Which standard stream a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Short lowercase name used in labels and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental line reader with an upper bound on line length.
///
/// Lines are split on `\n`; a trailing `\r` is dropped. The final line is
/// returned even when the stream ends without a newline. Lines must be UTF-8.
pub struct LineScanner<R> {
    lines: FramedRead<R, LinesCodec>,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> LineScanner<R> {
    /// Wrap `reader`, accepting lines of at most `max_line_bytes` bytes
    /// (excluding the newline).
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_bytes)),
            max_line_bytes,
        }
    }

    /// Maximum accepted line length.
    #[must_use]
    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Read the next line, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns `StreamReadError::LineTooLong` when a line exceeds the limit and
    /// `StreamReadError::Io` for any other read failure, including invalid UTF-8.
    pub async fn next_line(&mut self) -> Result<Option<String>, StreamReadError> {
        match self.lines.next().await {
            None => Ok(None),
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => Err(StreamReadError::LineTooLong {
                stream: StreamKind::Stdout,
                max: self.max_line_bytes,
            }),
            Some(Err(LinesCodecError::Io(source))) => Err(StreamReadError::Io {
                stream: StreamKind::Stdout,
                source,
            }),
        }
    }
}

/// Reads diagnostic text as blocks, without line splitting.
///
/// A block starts with the first read that returns data and keeps growing
/// while further reads arrive within the settle window. It ends when the
/// stream goes quiet, reaches end of stream, or grows past
/// [`MAX_BLOCK_BYTES`].
pub struct BlockReader<R> {
    reader: R,
    buf: Vec<u8>,
    settle: Duration,
    eof: bool,
    pending_error: Option<std::io::Error>,
}

impl<R: AsyncRead + Unpin> BlockReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_settle(reader, DEFAULT_DIAGNOSTIC_SETTLE)
    }

    /// Reader that ends a block after `settle` without new data.
    pub fn with_settle(reader: R, settle: Duration) -> Self {
        Self {
            reader,
            buf: vec![0; BLOCK_READ_CHUNK],
            settle,
            eof: false,
            pending_error: None,
        }
    }

    /// Read the next block, or `None` at end of stream.
    ///
    /// A single trailing line break is trimmed and blocks made only of line
    /// breaks are skipped. Invalid UTF-8 is replaced, never rejected.
    ///
    /// # Errors
    ///
    /// Returns `StreamReadError::Io` if the read fails. Text read before the
    /// failure is returned first.
    pub async fn next_block(&mut self) -> Result<Option<String>, StreamReadError> {
        loop {
            if let Some(source) = self.pending_error.take() {
                return Err(StreamReadError::Io {
                    stream: StreamKind::Stderr,
                    source,
                });
            }
            if self.eof {
                return Ok(None);
            }

            let n = self
                .reader
                .read(&mut self.buf)
                .await
                .map_err(|source| StreamReadError::Io {
                    stream: StreamKind::Stderr,
                    source,
                })?;
            if n == 0 {
                self.eof = true;
                return Ok(None);
            }

            let mut block = self.buf[..n].to_vec();
            while block.len() < MAX_BLOCK_BYTES {
                match tokio::time::timeout(self.settle, self.reader.read(&mut self.buf)).await {
                    Err(_) => break,
                    Ok(Ok(0)) => {
                        self.eof = true;
                        break;
                    }
                    Ok(Ok(n)) => block.extend_from_slice(&self.buf[..n]),
                    Ok(Err(e)) => {
                        self.pending_error = Some(e);
                        break;
                    }
                }
            }

            if let Some(text) = finish_block(&block) {
                return Ok(Some(text));
            }
        }
    }
}

/// Decode a raw block and drop one trailing line break.
fn finish_block(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    if text.trim_end_matches(['\r', '\n']).is_empty() {
        return None;
    }
    let text = text
        .strip_suffix('\n')
        .map_or(&*text, |rest| rest.strip_suffix('\r').unwrap_or(rest));
    Some(text.to_string())
}
