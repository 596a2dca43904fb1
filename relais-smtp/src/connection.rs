use std::fmt::Write;

use relais_common::tracing;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ConnectionError, ConnectionResult};

/// Longest reply line we will ever write, including the trailing CRLF
const MAX_RESPONSE: usize = 512;

/// Size of the internal read buffer
const BUFFER_SIZE: usize = 8192;

/// A client connection, read a line at a time.
pub struct Connection<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    stream: Stream,
    /// Internal read buffer to reduce syscalls (8KB)
    read_buf: Vec<u8>,
    /// Current position in read buffer
    read_pos: usize,
    /// Amount of valid data in read buffer
    read_len: usize,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    pub const fn new(stream: Stream) -> Self {
        Self {
            stream,
            read_buf: Vec::new(),
            read_pos: 0,
            read_len: 0,
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn send<S: core::fmt::Display + Send + Sync>(
        &mut self,
        response: &S,
    ) -> ConnectionResult<usize> {
        // Format response to stack-allocated buffer to avoid heap allocation
        let mut buffer = arrayvec::ArrayString::<MAX_RESPONSE>::new();
        write!(&mut buffer, "{response}\r\n").map_err(|_| {
            ConnectionError::ResponseTooLong(response.to_string().len().saturating_add(2))
        })?;

        self.stream.write_all(buffer.as_bytes()).await?;
        self.stream.flush().await?;

        Ok(buffer.len())
    }

    ///
    /// Read up to and including the next `\n` into `line`.
    ///
    /// At most `limit` bytes are stored; anything past that on the same line is
    /// consumed and discarded. Returns how many bytes the line really had, so a
    /// result larger than `line.len()` means it was cut short. `Ok(0)` means the
    /// peer closed the connection.
    ///
    /// # Errors
    /// If reading from the underlying stream fails
    ///
    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) async fn read_line(
        &mut self,
        line: &mut Vec<u8>,
        limit: usize,
    ) -> ConnectionResult<usize> {
        let mut consumed = 0;

        loop {
            if self.read_pos == self.read_len {
                if self.read_buf.is_empty() {
                    self.read_buf.resize(BUFFER_SIZE, 0);
                }

                let bytes_read = self.stream.read(&mut self.read_buf).await?;
                self.read_pos = 0;
                self.read_len = bytes_read;

                if bytes_read == 0 {
                    return Ok(consumed);
                }
            }

            let available = &self.read_buf[self.read_pos..self.read_len];
            let (chunk, complete) = available
                .iter()
                .position(|&b| b == b'\n')
                .map_or((available, false), |end| (&available[..=end], true));

            let room = limit.saturating_sub(line.len()).min(chunk.len());
            line.extend_from_slice(&chunk[..room]);

            self.read_pos += chunk.len();
            consumed += chunk.len();

            if complete {
                return Ok(consumed);
            }
        }
    }
}
