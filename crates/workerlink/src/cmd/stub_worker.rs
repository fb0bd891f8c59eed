use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use workerlink_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use workerlink_transport::{ControlSocket, WorkerStream};

use crate::cmd::{parse_duration, StubWorkerArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

/// Method the stub always rejects with a validation error.
const FAIL_METHOD: &str = "fail";

#[derive(Clone, Debug)]
struct NotifySpec {
    target_id: String,
    event: String,
    interval: Option<Duration>,
}

type SharedWriter = Arc<Mutex<FrameWriter<WorkerStream>>>;

pub fn run(args: StubWorkerArgs) -> CliResult<i32> {
    let notify = match (args.notify_target, args.notify_event) {
        (Some(target_id), Some(event)) => Some(NotifySpec {
            target_id,
            event,
            interval: args
                .notify_interval
                .as_deref()
                .map(parse_duration)
                .transpose()?,
        }),
        _ => None,
    };

    let frame = FrameConfig {
        read_timeout: args.idle_timeout.as_deref().map(parse_duration).transpose()?,
        write_timeout: args
            .write_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()?,
        ..FrameConfig::default()
    };

    let socket =
        ControlSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    tracing::info!(path = %args.path.display(), "stub worker listening");

    install_ctrlc_handler(socket.path().to_path_buf())?;

    loop {
        let stream = socket
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let notify = notify.clone();
        let frame = frame.clone();
        thread::spawn(move || {
            if let Err(err) = serve(stream, &frame, notify) {
                tracing::warn!(error = %err, "connection ended with error");
            }
        });
    }
}

fn serve(stream: WorkerStream, frame: &FrameConfig, notify: Option<NotifySpec>) -> CliResult<()> {
    let reader_stream = stream
        .try_clone()
        .map_err(|err| transport_error("clone failed", err))?;
    let mut reader = FrameReader::for_worker(reader_stream, frame.clone())
        .map_err(|err| frame_error("read timeout setup failed", err))?;
    let writer = FrameWriter::for_worker(stream, frame.clone())
        .map_err(|err| frame_error("write timeout setup failed", err))?;
    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    tracing::info!("host connected");

    if let Some(spec) = notify.clone() {
        if let Some(interval) = spec.interval {
            let writer = Arc::clone(&writer);
            thread::spawn(move || notify_periodically(writer, spec, interval));
        }
    }

    let mut handled = 0u64;
    loop {
        let payload = match reader.read_payload() {
            Ok(payload) => payload,
            Err(FrameError::ConnectionClosed) => {
                tracing::info!(handled, "host disconnected");
                return Ok(());
            }
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                tracing::info!(handled, "host idle, disconnecting");
                return Ok(());
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        let request: Value = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed request");
                continue;
            }
        };
        handled += 1;

        let method = request["method"].as_str().unwrap_or_default();
        let diagnostic = format!("Dhandling {method} id={}", request["id"]);
        send(&writer, diagnostic.as_bytes())?;
        send(&writer, respond(&request).to_string().as_bytes())?;

        if let Some(spec) = &notify {
            send(
                &writer,
                notification(spec, json!({"method": method})).to_string().as_bytes(),
            )?;
        }
    }
}

/// Build the reply for one request: echo `data` as accepted, or reject
/// [`FAIL_METHOD`] with a `TypeError`.
fn respond(request: &Value) -> Value {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default();

    if method == FAIL_METHOD {
        return json!({
            "id": id,
            "error": "TypeError",
            "reason": format!("method '{method}' rejected by stub worker"),
        });
    }

    match request.get("data") {
        Some(data) => json!({"id": id, "accepted": true, "data": data}),
        None => json!({"id": id, "accepted": true}),
    }
}

fn notification(spec: &NotifySpec, data: Value) -> Value {
    json!({
        "targetId": spec.target_id,
        "event": spec.event,
        "data": data,
    })
}

fn notify_periodically(writer: SharedWriter, spec: NotifySpec, interval: Duration) {
    let mut seq = 0u64;
    loop {
        thread::sleep(interval);
        seq += 1;
        let payload = notification(&spec, json!({"seq": seq})).to_string();
        if send(&writer, payload.as_bytes()).is_err() {
            return;
        }
    }
}

fn send(writer: &SharedWriter, payload: &[u8]) -> CliResult<()> {
    let mut writer = match writer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    writer
        .write_payload(payload)
        .map_err(|err| frame_error("send failed", err))
}

/// `accept` blocks, so Ctrl-C exits from the handler and unlinks the socket itself.
fn install_ctrlc_handler(path: PathBuf) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = std::fs::remove_file(&path);
        std::process::exit(SUCCESS);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
