//! Byte-chunk transport abstractions
//!
//! The session never touches sockets directly. It pulls chunks from a
//! [`ChunkSource`] and pushes encoded frames into a [`ChunkSink`]; adapters
//! are provided for tokio I/O types and for in-memory channels.

use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Incoming side of a connection
pub trait ChunkSource: Send + 'static {
    /// Next chunk of bytes, or `None` at end of stream
    ///
    /// Chunks may split frames anywhere.
    fn next_chunk(&mut self) -> impl Future<Output = io::Result<Option<Bytes>>> + Send;
}

/// Outgoing side of a connection
pub trait ChunkSink: Send + 'static {
    fn write(&mut self, bytes: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Push anything buffered out to the peer
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Default read size for [`IoSource`]
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// [`ChunkSource`] over any tokio reader
pub struct IoSource<R> {
    reader: R,
    chunk_size: usize,
    buf: BytesMut,
}

impl<R> IoSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            buf: BytesMut::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R> ChunkSource for IoSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.buf.reserve(self.chunk_size);
        let n = self.reader.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf.split().freeze()))
    }
}

/// [`ChunkSink`] over any tokio writer
pub struct IoSink<W> {
    writer: W,
}

impl<W> IoSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> ChunkSink for IoSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&mut self, bytes: Bytes) -> io::Result<()> {
        self.writer.write_all(&bytes).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

impl ChunkSource for mpsc::Receiver<Bytes> {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.recv().await)
    }
}

impl ChunkSink for mpsc::Sender<Bytes> {
    async fn write(&mut self, bytes: Bytes) -> io::Result<()> {
        self.send(bytes)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "chunk receiver dropped"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn io_source_yields_reads_as_chunks() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0x81, 0x05, 0x48])
            .read(&[0x65, 0x6c, 0x6c, 0x6f])
            .build();
        let mut source = IoSource::new(reader, 16);

        assert_eq!(
            source.next_chunk().await.unwrap().as_deref(),
            Some(&[0x81, 0x05, 0x48][..])
        );
        assert_eq!(
            source.next_chunk().await.unwrap().as_deref(),
            Some(&[0x65, 0x6c, 0x6c, 0x6f][..])
        );
        assert_eq!(source.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn io_sink_writes_through() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut sink = IoSink::new(client);

        sink.write(Bytes::from_static(b"abc")).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"abc");
    }

    #[tokio::test]
    async fn channel_adapters_round_trip() {
        let (mut tx, mut rx) = mpsc::channel::<Bytes>(4);

        ChunkSink::write(&mut tx, Bytes::from_static(b"xy")).await.unwrap();
        drop(tx);

        assert_eq!(rx.next_chunk().await.unwrap().as_deref(), Some(&b"xy"[..]));
        assert_eq!(rx.next_chunk().await.unwrap(), None);
    }
}
