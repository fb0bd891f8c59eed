//! The payload boundary the multiplexer is written against.
//!
//! The channel only needs "read next payload", "write one payload" and
//! "close". [`FramedSource`]/[`FramedSink`] provide those over any Tokio byte
//! stream using the length-prefixed [`PayloadCodec`].

use std::future::Future;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use workerlink_frame::{FrameError, PayloadCodec};

/// Read half of a payload transport.
pub trait PayloadSource: Send + 'static {
    /// Read the next complete payload.
    ///
    /// End of stream is reported as [`FrameError::ConnectionClosed`].
    fn read_payload(&mut self) -> impl Future<Output = Result<Bytes, FrameError>> + Send;
}

/// Write half of a payload transport.
pub trait PayloadSink: Send + 'static {
    /// Write one payload and flush it.
    fn write_payload(&mut self, payload: Bytes)
        -> impl Future<Output = Result<(), FrameError>> + Send;

    /// Shut the write half down. Errors are ignored by the channel.
    fn close(&mut self) -> impl Future<Output = Result<(), FrameError>> + Send;
}

/// [`PayloadSource`] over a Tokio reader.
#[derive(Debug)]
pub struct FramedSource<R> {
    inner: FramedRead<R, PayloadCodec>,
}

impl<R: AsyncRead + Unpin> FramedSource<R> {
    pub fn new(reader: R, max_payload_size: usize) -> Self {
        Self {
            inner: FramedRead::new(reader, PayloadCodec::new(max_payload_size)),
        }
    }
}

impl<R> PayloadSource for FramedSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read_payload(&mut self) -> Result<Bytes, FrameError> {
        match self.inner.next().await {
            Some(result) => result,
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

/// [`PayloadSink`] over a Tokio writer.
#[derive(Debug)]
pub struct FramedSink<W> {
    inner: FramedWrite<W, PayloadCodec>,
}

impl<W: AsyncWrite + Unpin> FramedSink<W> {
    pub fn new(writer: W, max_payload_size: usize) -> Self {
        Self {
            inner: FramedWrite::new(writer, PayloadCodec::new(max_payload_size)),
        }
    }
}

impl<W> PayloadSink for FramedSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_payload(&mut self, payload: Bytes) -> Result<(), FrameError> {
        self.inner.send(payload).await
    }

    async fn close(&mut self) -> Result<(), FrameError> {
        SinkExt::<Bytes>::close(&mut self.inner).await
    }
}

/// Frame a reader/writer pair.
pub fn framed<R, W>(
    reader: R,
    writer: W,
    max_payload_size: usize,
) -> (FramedSource<R>, FramedSink<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (
        FramedSource::new(reader, max_payload_size),
        FramedSink::new(writer, max_payload_size),
    )
}

/// Split a connected Unix stream into framed halves.
#[cfg(unix)]
pub fn framed_unix(
    stream: tokio::net::UnixStream,
    max_payload_size: usize,
) -> (
    FramedSource<tokio::net::unix::OwnedReadHalf>,
    FramedSink<tokio::net::unix::OwnedWriteHalf>,
) {
    let (reader, writer) = stream.into_split();
    framed(reader, writer, max_payload_size)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn duplex_payloads_round_trip() {
        let (host, worker) = tokio::io::duplex(256);
        let (mut source, _) = framed(worker, tokio::io::sink(), 1024);
        let mut sink = FramedSink::new(host, 1024);

        sink.write_payload(Bytes::from_static(b"Dworker up"))
            .await
            .unwrap();
        sink.write_payload(Bytes::from_static(b"{\"id\":1,\"accepted\":true}"))
            .await
            .unwrap();
        sink.close().await.unwrap();
        drop(sink);

        assert_eq!(source.read_payload().await.unwrap().as_ref(), b"Dworker up");
        assert_eq!(
            source.read_payload().await.unwrap().as_ref(),
            b"{\"id\":1,\"accepted\":true}"
        );
        assert!(matches!(
            source.read_payload().await.unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[tokio::test]
    async fn oversized_incoming_payload_is_an_error() {
        let (mut host, worker) = tokio::io::duplex(256);
        let mut source = FramedSource::new(worker, 8);

        host.write_all(&64u32.to_le_bytes()).await.unwrap();
        let err = source.read_payload().await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 64, max: 8 }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_halves_carry_payloads() {
        let (left, right) = tokio::net::UnixStream::pair().unwrap();
        let (_, mut sink) = framed_unix(left, 1024);
        let (mut source, _) = framed_unix(right, 1024);

        sink.write_payload(Bytes::from_static(b"Wslow"))
            .await
            .unwrap();
        assert_eq!(source.read_payload().await.unwrap().as_ref(), b"Wslow");
    }
}
