//! Framed Transport
//!
//! Two framing modes over a reliable byte stream: newline-delimited UTF-8
//! lines for the handshake, and whole-message framing for the chat layer
//! where one payload occupies one full connection lifetime.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 1024;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("received line is not valid UTF-8")]
    InvalidUtf8,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Newline-framed wrapper around a byte stream.
///
/// Reads are buffered internally, so lines split across network reads and
/// multiple lines arriving in one read are both handled correctly.
pub struct FramedTransport<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Send one line, appending the `\n` delimiter
    pub async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        Ok(())
    }

    /// Receive one full line, without its delimiter.
    ///
    /// Blocks until a delimiter is observed; if the stream closes before a
    /// full line arrives this fails with `ConnectionClosed`.
    pub async fn recv_line(&mut self) -> Result<String, TransportError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                return String::from_utf8(line).map_err(|_| TransportError::InvalidUtf8);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Consume the transport, returning the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Write one whole message and half-close the stream, signalling EOF to the
/// peer. The connection boundary is the message boundary.
pub async fn write_message<S>(stream: &mut S, payload: &[u8]) -> Result<(), TransportError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(payload).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Read one whole message: everything the peer sends until EOF
pub async fn read_message<S>(stream: &mut S) -> Result<Vec<u8>, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    stream.read_to_end(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let (client, mut server) = tokio::io::duplex(16);
        let mut transport = FramedTransport::new(client);

        server.write_all(b"Z|").await.unwrap();
        tokio::spawn(async move {
            server.write_all(b"1\nX|0\n").await.unwrap();
        });

        assert_eq!(transport.recv_line().await.unwrap(), "Z|1");
        assert_eq!(transport.recv_line().await.unwrap(), "X|0");
    }

    #[tokio::test]
    async fn test_multiple_lines_in_one_read() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(client);

        server.write_all(b"one\ntwo\nthree\n").await.unwrap();
        assert_eq!(transport.recv_line().await.unwrap(), "one");
        assert_eq!(transport.recv_line().await.unwrap(), "two");
        assert_eq!(transport.recv_line().await.unwrap(), "three");
    }

    #[tokio::test]
    async fn test_closed_before_delimiter() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = FramedTransport::new(client);

        server.write_all(b"partial line without newline").await.unwrap();
        drop(server);

        match transport.recv_line().await {
            Err(TransportError::ConnectionClosed) => {}
            other => panic!("expected ConnectionClosed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_line_appends_delimiter() {
        let (client, server) = tokio::io::duplex(64);
        let mut sender = FramedTransport::new(client);
        let mut receiver = FramedTransport::new(server);

        sender.send_line("SAMPLE:1,2,3").await.unwrap();
        assert_eq!(receiver.recv_line().await.unwrap(), "SAMPLE:1,2,3");
    }

    #[tokio::test]
    async fn test_whole_message_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::spawn(async move {
            write_message(&mut client, b"one whole payload").await.unwrap();
        });

        let payload = read_message(&mut server).await.unwrap();
        assert_eq!(payload, b"one whole payload");
    }
}
