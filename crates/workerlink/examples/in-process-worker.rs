//! Drive a toy worker that lives on the other end of an in-memory pipe.
//!
//! Run with:
//!   cargo run --example in-process-worker
//!
//! Against a real socket, start the stub worker in one terminal:
//!   cargo run --features cli -- stub-worker /tmp/workerlink.sock \
//!     --notify-target r1 --notify-event requested
//!
//! and issue a request from another:
//!   cargo run --features cli -- request /tmp/workerlink.sock \
//!     --method router.dump --internal '{"routerId":"r1"}' --data '{"verbose":true}'

use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use workerlink::channel::{framed, PayloadSink, PayloadSource};
use workerlink::{Channel, ChannelConfig, Notification, TargetSelector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, worker) = tokio::io::duplex(64 * 1024);
    let (host_read, host_write) = tokio::io::split(host);
    let (worker_read, worker_write) = tokio::io::split(worker);

    tokio::spawn(toy_worker(worker_read, worker_write));

    let (source, sink) = framed(host_read, host_write, 64 * 1024);
    let channel = Channel::open(
        source,
        sink,
        ChannelConfig::default().with_request_timeout(Duration::from_secs(1)),
    );

    channel.subscribe("r1", "requested", |n: &Notification| {
        eprintln!("notification {} from {}: {:?}", n.event, n.target_id, n.data);
    });
    channel.on_close(|| eprintln!("channel closed"));

    let router = TargetSelector::new().with("routerId", "r1");
    let dump = channel
        .request("router.dump", &router, Some(json!({"verbose": true})))
        .await?;
    eprintln!("router.dump -> {:?}", dump.data());

    match channel.request("fail", &router, None).await {
        Ok(_) => eprintln!("fail unexpectedly accepted"),
        Err(err) => eprintln!("fail -> {err}"),
    }

    channel.close();
    Ok(())
}

async fn toy_worker<R, W>(reader: R, writer: W)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut source, mut sink) = framed(reader, writer, 64 * 1024);

    while let Ok(payload) = source.read_payload().await {
        let Ok(request) = serde_json::from_slice::<Value>(&payload) else {
            continue;
        };
        let method = request["method"].as_str().unwrap_or_default().to_string();

        let reply = if method == "fail" {
            json!({"id": request["id"], "error": "TypeError", "reason": "unsupported method"})
        } else {
            json!({"id": request["id"], "accepted": true, "data": request["data"]})
        };
        let event = json!({
            "targetId": request["internal"]["routerId"],
            "event": "requested",
            "data": {"method": method},
        });

        for payload in [
            format!("Dhandling {method}"),
            reply.to_string(),
            event.to_string(),
        ] {
            if sink.write_payload(Bytes::from(payload)).await.is_err() {
                return;
            }
        }
    }
}
