//! The multiplexed control channel.
//!
//! One writer task owns the sink and one reader task owns the source. Callers
//! hand requests to the writer through a bounded queue and wait on a oneshot
//! that the reader completes when the matching response arrives.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};
use workerlink_frame::FrameError;

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::message::{
    classify, DiagnosticLevel, DiagnosticLine, Incoming, Notification, RequestMessage, Response,
    ResponseMessage, ResponseOutcome, TargetSelector,
};
use crate::pending::{PendingEntry, PendingGuard, PendingTable, RequestIds};
use crate::router::{NotificationRouter, SubscriptionId};
use crate::transport::{PayloadSink, PayloadSource};

/// Tracing target for diagnostic lines re-emitted from the worker.
pub const WORKER_LOG_TARGET: &str = "workerlink::worker";

/// How long the writer waits for the sink to flush and shut down on close.
const SINK_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type CloseCallback = Box<dyn FnOnce() + Send>;

struct Outgoing {
    id: u32,
    payload: Bytes,
}

struct Shared {
    config: ChannelConfig,
    pending: PendingTable,
    ids: RequestIds,
    router: NotificationRouter,
    outgoing: mpsc::Sender<Outgoing>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    close_callbacks: Mutex<Vec<CloseCallback>>,
}

/// Handle to a control channel. Cheap to clone; all clones share one link.
///
/// The channel closes when [`Channel::close`] is called, when the link fails,
/// or when the last handle is dropped.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_requests())
            .field("worker_pid", &self.shared.config.worker_pid)
            .finish()
    }
}

impl Channel {
    /// Start the reader and writer tasks over a payload transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<S, K>(source: S, sink: K, config: ChannelConfig) -> Self
    where
        S: PayloadSource,
        K: PayloadSink,
    {
        let (outgoing, queue) = mpsc::channel(config.write_queue_capacity.max(1));
        let shutdown = CancellationToken::new();

        let shared = Arc::new(Shared {
            config,
            pending: PendingTable::new(),
            ids: RequestIds::new(),
            router: NotificationRouter::new(),
            outgoing,
            closed: AtomicBool::new(false),
            shutdown: shutdown.clone(),
            close_callbacks: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&shared);
        tokio::spawn(write_loop(sink, queue, weak.clone(), shutdown.clone()));
        tokio::spawn(read_loop(source, weak, shutdown));

        debug!(worker_pid = shared.config.worker_pid, "channel opened");
        Self { shared }
    }

    /// Send a request and wait for its response using the configured timeout.
    pub async fn request(
        &self,
        method: &str,
        target: &TargetSelector,
        data: Option<Value>,
    ) -> Result<Response> {
        let timeout = self.shared.config.request_timeout;
        self.request_with_timeout(method, target, data, timeout)
            .await
    }

    /// Send a request and deserialize the response data.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        target: &TargetSelector,
        data: Option<Value>,
    ) -> Result<T> {
        self.request(method, target, data).await?.parse()
    }

    /// Send a request and wait at most `timeout` for its response.
    ///
    /// The timeout covers both the hand-off to the writer and the wait for
    /// the response.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        target: &TargetSelector,
        data: Option<Value>,
        timeout: Duration,
    ) -> Result<Response> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(ChannelError::Closed);
        }
        let deadline = Instant::now() + timeout;

        let id = shared.ids.next();
        let payload = serde_json::to_vec(&RequestMessage {
            id,
            method,
            internal: target,
            data: data.filter(|data| !data.is_null()),
        })?;
        if payload.len() > shared.config.max_payload_size {
            return Err(ChannelError::RequestTooLarge {
                size: payload.len(),
                max: shared.config.max_payload_size,
            });
        }

        let (reply, response) = oneshot::channel();
        shared.pending.register(
            id,
            PendingEntry {
                method: method.to_string(),
                reply,
            },
        )?;
        let _guard = PendingGuard::new(&shared.pending, id);
        debug!(id, method, "sending request");

        let outgoing = Outgoing {
            id,
            payload: Bytes::from(payload),
        };
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => return Err(closed_while_pending(id, method)),
            sent = shared.outgoing.send(outgoing) => {
                if sent.is_err() {
                    return Err(closed_while_pending(id, method));
                }
            }
            _ = sleep_until(deadline) => return Err(timed_out(id, method, timeout)),
        }

        let outcome = tokio::select! {
            biased;
            reply = response => reply.unwrap_or_else(|_| Err(closed_while_pending(id, method))),
            _ = shared.shutdown.cancelled() => Err(closed_while_pending(id, method)),
            _ = sleep_until(deadline) => Err(timed_out(id, method, timeout)),
        };

        match &outcome {
            Ok(_) => debug!(id, method, "request accepted"),
            Err(ChannelError::Timeout { .. }) => warn!(id, method, ?timeout, "request timed out"),
            Err(err) => debug!(id, method, error = %err, "request failed"),
        }
        outcome
    }

    /// Subscribe to `event` notifications emitted by `target_id`.
    pub fn subscribe<F>(
        &self,
        target_id: impl Into<String>,
        event: impl Into<String>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.shared.router.subscribe(target_id, event, handler)
    }

    pub fn unsubscribe(&self, target_id: &str, subscription: SubscriptionId) -> bool {
        self.shared.router.unsubscribe(target_id, subscription)
    }

    pub fn unsubscribe_all(&self, target_id: &str) {
        self.shared.router.unsubscribe_all(target_id);
    }

    pub fn subscriber_count(&self, target_id: &str) -> usize {
        self.shared.router.subscriber_count(target_id)
    }

    /// Close the channel. Idempotent.
    ///
    /// Every in-flight request fails with [`ChannelError::ClosedWhilePending`]
    /// and every later request with [`ChannelError::Closed`].
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Wait until the channel has been closed.
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await;
    }

    /// Run `callback` once when the channel closes, or now if it already has.
    pub fn on_close<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = lock_callbacks(&self.shared.close_callbacks);
        if !self.shared.is_closed() {
            callbacks.push(Box::new(callback));
            return;
        }
        drop(callbacks);
        callback();
    }

    /// Number of requests still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        debug!(worker_pid = self.config.worker_pid, "closing channel");
        self.shutdown.cancel();

        for (id, entry) in self.pending.drain() {
            let method = entry.method.clone();
            entry.complete(Err(ChannelError::ClosedWhilePending { id, method }));
        }
        self.router.clear();

        let callbacks = std::mem::take(&mut *lock_callbacks(&self.close_callbacks));
        for callback in callbacks {
            callback();
        }
    }

    fn handle_payload(&self, payload: &[u8]) {
        match classify(payload) {
            Ok(Incoming::Response(response)) => self.deliver_response(response),
            Ok(Incoming::Notification(notification)) => self.router.dispatch(notification),
            Ok(Incoming::Diagnostic(line)) => self.log_diagnostic(line),
            Err(violation) => {
                warn!(error = %violation, size = payload.len(), "dropping invalid message from worker");
            }
        }
    }

    fn deliver_response(&self, response: ResponseMessage) {
        let id = response.id;
        let Some(PendingEntry { method, reply }) = self.pending.take(id) else {
            warn!(id, "response for unknown request, dropping");
            return;
        };

        let outcome = match response.outcome {
            ResponseOutcome::Accepted(data) => Ok(Response::new(data)),
            ResponseOutcome::Rejected(err) => Err(ChannelError::Worker(err)),
            ResponseOutcome::Unrecognized => {
                warn!(id, %method, "response is neither accepted nor rejected");
                Err(ChannelError::MalformedResponse {
                    id,
                    method: method.clone(),
                })
            }
        };

        if reply.send(outcome).is_err() {
            debug!(id, %method, "requester gone, dropping response");
        }
    }

    fn fail_write(&self, id: u32, err: FrameError) {
        error!(id, error = %err, "failed to write request");
        if let Some(PendingEntry { method, reply }) = self.pending.take(id) {
            let _ = reply.send(Err(ChannelError::WriteFailed {
                id,
                method,
                source: err,
            }));
        }
    }

    fn log_diagnostic(&self, line: DiagnosticLine) {
        let pid = self.config.worker_pid;
        let text = line.text.as_str();
        match line.level {
            DiagnosticLevel::Debug => debug!(target: WORKER_LOG_TARGET, pid, "{text}"),
            DiagnosticLevel::Warn => warn!(target: WORKER_LOG_TARGET, pid, "{text}"),
            DiagnosticLevel::Error => error!(target: WORKER_LOG_TARGET, pid, "{text}"),
            DiagnosticLevel::Dump => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{text}");
            }
            DiagnosticLevel::Unrecognized(tag) => warn!(
                target: WORKER_LOG_TARGET,
                pid,
                tag = %char::from(tag),
                "unexpected data from worker: {text}"
            ),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_callbacks(callbacks: &Mutex<Vec<CloseCallback>>) -> MutexGuard<'_, Vec<CloseCallback>> {
    match callbacks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn closed_while_pending(id: u32, method: &str) -> ChannelError {
    ChannelError::ClosedWhilePending {
        id,
        method: method.to_string(),
    }
}

fn timed_out(id: u32, method: &str, timeout: Duration) -> ChannelError {
    ChannelError::Timeout {
        id,
        method: method.to_string(),
        timeout,
    }
}

async fn write_loop<K: PayloadSink>(
    mut sink: K,
    mut queue: mpsc::Receiver<Outgoing>,
    shared: Weak<Shared>,
    shutdown: CancellationToken,
) {
    loop {
        let outgoing = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(outgoing) => outgoing,
                None => break,
            },
        };

        let id = outgoing.id;
        trace!(id, size = outgoing.payload.len(), "writing request");
        let written = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            written = sink.write_payload(outgoing.payload) => written,
        };

        if let Err(err) = written {
            let link_failure = err.is_link_failure();
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.fail_write(id, err);
            if link_failure {
                shared.close();
                break;
            }
        }
    }

    if tokio::time::timeout(SINK_CLOSE_TIMEOUT, sink.close())
        .await
        .is_err()
    {
        debug!("timed out closing channel sink");
    }
    trace!("writer loop finished");
}

async fn read_loop<S: PayloadSource>(
    mut source: S,
    shared: Weak<Shared>,
    shutdown: CancellationToken,
) {
    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            read = source.read_payload() => read,
        };

        let Some(shared) = shared.upgrade() else {
            break;
        };
        match read {
            Ok(payload) => shared.handle_payload(&payload),
            Err(FrameError::ConnectionClosed) => {
                debug!("worker closed the channel");
                shared.close();
                break;
            }
            Err(err) => {
                error!(error = %err, "channel read failed");
                shared.close();
                break;
            }
        }
    }
    trace!("reader loop finished");
}
