use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use workerlink_frame::{FrameError, PayloadCodec};

#[tokio::test]
async fn framed_payloads_cross_a_duplex_pipe() {
    let (host, worker) = tokio::io::duplex(64);
    let mut sink = FramedWrite::new(host, PayloadCodec::default());
    let mut source = FramedRead::new(worker, PayloadCodec::default());

    let writer = tokio::spawn(async move {
        sink.send(Bytes::from_static(b"{\"id\":1,\"method\":\"dump\"}"))
            .await
            .unwrap();
        sink.send(Bytes::from(vec![b'x'; 1024])).await.unwrap();
        // Dropping the sink closes the pipe.
    });

    let first = source.next().await.unwrap().unwrap();
    assert_eq!(first.as_ref(), b"{\"id\":1,\"method\":\"dump\"}");
    let second = source.next().await.unwrap().unwrap();
    assert_eq!(second.len(), 1024);

    writer.await.unwrap();
    assert!(source.next().await.is_none());
}

#[tokio::test]
async fn truncated_stream_reports_connection_closed() {
    use tokio::io::AsyncWriteExt;

    let (mut host, worker) = tokio::io::duplex(64);
    let mut source = FramedRead::new(worker, PayloadCodec::default());

    host.write_all(&10u32.to_le_bytes()).await.unwrap();
    host.write_all(b"abc").await.unwrap();
    drop(host);

    let err = source.next().await.unwrap().unwrap_err();
    assert!(matches!(err, FrameError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_outgoing_payload_is_rejected() {
    let (host, _worker) = tokio::io::duplex(64);
    let mut sink = FramedWrite::new(host, PayloadCodec::new(8));

    let err = sink
        .send(Bytes::from_static(b"much too long"))
        .await
        .unwrap_err();
    assert!(matches!(err, FrameError::PayloadTooLarge { size: 13, max: 8 }));
}
