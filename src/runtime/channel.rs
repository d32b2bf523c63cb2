//! Line channel over a connected byte stream.
//!
//! Provides newline-delimited text reads and writes with no protocol
//! knowledge. Every write is flushed before it returns, so the peer can
//! observe a response before the next read starts.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::LineCodec;
use crate::error::TransportError;

/// Read half of a line channel.
pub struct LineReader<R> {
    inner: FramedRead<R, LineCodec>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self {
            inner: FramedRead::new(reader, LineCodec::with_max_length(max_line_length)),
        }
    }

    /// Read the next line. `Ok(None)` means the peer closed the stream.
    pub async fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        self.inner.next().await.transpose()
    }
}

/// Write half of a line channel.
pub struct LineWriter<W> {
    inner: FramedWrite<W, LineCodec>,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, LineCodec::new()),
        }
    }

    /// Write `text` followed by `\n` and flush.
    pub async fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        self.inner.send(text).await
    }

    /// Flush and shut down the write direction.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<&str>::close(&mut self.inner).await
    }
}

/// Bidirectional newline-delimited text transport.
pub struct LineChannel<R, W> {
    reader: LineReader<R>,
    writer: LineWriter<W>,
}

impl LineChannel<OwnedReadHalf, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream, max_line_length: usize) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, max_line_length)
    }
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, max_line_length: usize) -> Self {
        Self {
            reader: LineReader::new(reader, max_line_length),
            writer: LineWriter::new(writer),
        }
    }

    pub async fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        self.reader.read_line().await
    }

    pub async fn write_line(&mut self, text: &str) -> Result<(), TransportError> {
        self.writer.write_line(text).await
    }

    /// Shut down the write direction and release the read direction.
    pub async fn close(self) -> Result<(), TransportError> {
        let LineChannel { reader, mut writer } = self;
        drop(reader);
        writer.close().await
    }

    pub fn split(self) -> (LineReader<R>, LineWriter<W>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::codec::MAX_LINE_LENGTH;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_read_until_end_of_stream() {
        let reader = tokio_test::io::Builder::new()
            .read(b"PING\r\n")
            .read(b"CAR BMW\n")
            .build();
        let writer = tokio_test::io::Builder::new().build();
        let mut channel = LineChannel::new(reader, writer, MAX_LINE_LENGTH);

        assert_eq!(channel.read_line().await.unwrap().as_deref(), Some("PING"));
        assert_eq!(
            channel.read_line().await.unwrap().as_deref(),
            Some("CAR BMW")
        );
        assert!(channel.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_is_flushed_per_line() {
        let (client, server) = tokio::io::duplex(64);
        let (server_read, server_write) = tokio::io::split(server);
        let mut channel = LineChannel::new(server_read, server_write, MAX_LINE_LENGTH);

        channel.write_line("PONG").await.unwrap();

        let (mut client_read, _client_write) = tokio::io::split(client);
        let mut buf = [0u8; 5];
        client_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG\n");
    }

    #[tokio::test]
    async fn test_close_signals_end_of_stream() {
        let (client, server) = tokio::io::duplex(64);
        let (server_read, server_write) = tokio::io::split(server);
        let channel = LineChannel::new(server_read, server_write, MAX_LINE_LENGTH);
        channel.close().await.unwrap();

        let (mut client_read, _client_write) = tokio::io::split(client);
        let mut rest = Vec::new();
        client_read.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_writer_close_flushes_and_shuts_down() {
        let (client, server) = tokio::io::duplex(64);
        let (_server_read, server_write) = tokio::io::split(server);
        let mut writer = LineWriter::new(server_write);

        writer.write_line("OK Goodbye").await.unwrap();
        writer.close().await.unwrap();

        let (mut client_read, _client_write) = tokio::io::split(client);
        let mut rest = Vec::new();
        client_read.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"OK Goodbye\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_delivered() {
        let reader = tokio_test::io::Builder::new()
            .read(b"CAR \xC5koda\nPING\n")
            .build();
        let mut reader = LineReader::new(reader, MAX_LINE_LENGTH);

        assert_eq!(
            reader.read_line().await.unwrap().as_deref(),
            Some("CAR \u{FFFD}koda")
        );
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("PING"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_to_closed_peer_fails() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let (server_read, server_write) = tokio::io::split(server);
        let mut channel = LineChannel::new(server_read, server_write, MAX_LINE_LENGTH);

        match channel.write_line("PONG").await {
            Err(TransportError::Io(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
