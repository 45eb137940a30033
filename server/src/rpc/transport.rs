//! Newline-delimited JSON-RPC transport
//!
//! One JSON message per line. The server runs it over stdin/stdout; tests
//! run it over in-memory buffers.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// A line read from the peer
#[derive(Debug)]
pub enum Incoming {
    Request(JsonRpcRequest),
    /// The line was not a valid request; carries the parse failure
    Invalid(String),
    /// Blank line, nothing to do
    Empty,
}

/// Async line transport over any reader/writer pair
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

impl LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the next line. `Ok(None)` means the peer closed the stream.
    pub async fn read(&mut self) -> io::Result<Option<Incoming>> {
        let mut buf = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut buf).await?;

        if bytes_read == 0 {
            return Ok(None); // EOF
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::error!("Dropping non UTF-8 line: {}", e);
                return Ok(Some(Incoming::Invalid(format!("invalid UTF-8: {}", e))));
            }
        };
        if line.is_empty() {
            return Ok(Some(Incoming::Empty));
        }

        match serde_json::from_str(line) {
            Ok(request) => Ok(Some(Incoming::Request(request))),
            Err(e) => {
                tracing::error!("Failed to parse JSON-RPC request: {}", e);
                Ok(Some(Incoming::Invalid(e.to_string())))
            }
        }
    }

    /// Write one response line and flush
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}
