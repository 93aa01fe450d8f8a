//! Line framing over a swappable byte stream

use crate::protocol::{literal_length, MAX_LINE_LENGTH, MAX_LITERAL_SIZE};
use crate::{ImapError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Any bidirectional byte stream: plain TCP, TLS, or an in-memory pipe
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Buffered connection reading CRLF-terminated lines
pub struct Connection {
    reader: BufReader<Box<dyn AsyncStream>>,
}

impl Connection {
    pub fn new(stream: Box<dyn AsyncStream>) -> Self {
        Connection {
            reader: BufReader::new(stream),
        }
    }

    /// Read one logical response line without its CRLF.
    ///
    /// Literals announced with a trailing `{n}` are read and inlined, so the
    /// caller always sees a complete response.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = self.read_physical_line().await?;

        while let Some(length) = literal_length(&line) {
            if length > MAX_LITERAL_SIZE {
                return Err(ImapError::Protocol(format!(
                    "literal of {} bytes is too large",
                    length
                )));
            }

            let mut literal = vec![0u8; length];
            self.reader.read_exact(&mut literal).await?;
            line.push_str(&String::from_utf8_lossy(&literal));

            let rest = self.read_physical_line().await?;
            line.push_str(&rest);
            if line.len() > MAX_LINE_LENGTH + MAX_LITERAL_SIZE {
                return Err(ImapError::LineTooLong(MAX_LINE_LENGTH + MAX_LITERAL_SIZE));
            }
        }

        Ok(line)
    }

    async fn read_physical_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let limit = MAX_LINE_LENGTH as u64 + 2;
        let read = (&mut self.reader).take(limit).read_until(b'\n', &mut buf).await?;

        if read == 0 {
            return Err(ImapError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        if !buf.ends_with(b"\n") {
            if buf.len() as u64 >= limit {
                return Err(ImapError::LineTooLong(MAX_LINE_LENGTH));
            }
            return Err(ImapError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }

        buf.pop();
        if buf.ends_with(b"\r") {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.reader.get_mut().write_all(bytes).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.reader.get_mut().flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.reader.get_mut().shutdown().await?;
        Ok(())
    }

    /// Give up the underlying stream, e.g. to wrap it in TLS.
    ///
    /// Fails if the peer already sent bytes past the last line: data that
    /// arrived before the handshake must not be trusted as if it came after.
    pub fn into_stream(self) -> Result<Box<dyn AsyncStream>> {
        if !self.reader.buffer().is_empty() {
            return Err(ImapError::Protocol(
                "unexpected data buffered before TLS negotiation".into(),
            ));
        }
        Ok(self.reader.into_inner())
    }
}
