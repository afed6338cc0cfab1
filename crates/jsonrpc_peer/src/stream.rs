use std::io;

use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};

use crate::protocol::{decode_message, Inbound, JsonRpcError, JsonRpcMessage};

/// Newline-delimited JSON framing over a duplex byte stream: one frame per
/// line on both sides.
pub struct JsonRpcStream<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> JsonRpcStream<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub(crate) fn split(self) -> (StreamReader<R>, StreamWriter<W>) {
        (
            StreamReader {
                lines: BufReader::new(self.reader).lines(),
            },
            StreamWriter {
                writer: self.writer,
            },
        )
    }
}

impl JsonRpcStream<Stdin, Stdout> {
    /// Frames JSON-RPC over this process's own stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

pub(crate) struct StreamReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    /// Pulls the next frame. Blank lines are skipped; a line that is not
    /// valid JSON comes back as [`Inbound::Malformed`]. `None` means the
    /// stream is gone (EOF or read failure).
    pub(crate) async fn recv(&mut self) -> Option<Inbound> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => return None,
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(match serde_json::from_str::<Value>(&line) {
                Ok(value) => match decode_message(&value) {
                    Some(message) => Inbound::Message(message),
                    None => Inbound::Unknown(value),
                },
                Err(err) => Inbound::Malformed(JsonRpcError::parse_error(err.to_string())),
            });
        }
    }
}

pub(crate) struct StreamWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> StreamWriter<W> {
    pub(crate) async fn send(&mut self, message: &JsonRpcMessage) -> io::Result<()> {
        let payload = serde_json::to_string(message)?;
        self.writer.write_all(payload.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Idempotent close of the write half.
    pub(crate) async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}
