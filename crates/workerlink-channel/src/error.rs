use std::fmt;
use std::time::Duration;

use workerlink_frame::FrameError;
use workerlink_transport::TransportError;

/// Errors surfaced to callers of the channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel was already closed when the request was issued.
    #[error("channel closed")]
    Closed,

    /// The channel closed while the request was in flight.
    #[error("channel closed, id: {id}, method: {method}")]
    ClosedWhilePending { id: u32, method: String },

    /// The serialized request exceeds the transport's payload limit.
    #[error("request too big ({size} bytes, max {max})")]
    RequestTooLarge { size: usize, max: usize },

    /// The writer could not put the request on the wire.
    #[error("failed to write request, id: {id}, method: {method}: {source}")]
    WriteFailed {
        id: u32,
        method: String,
        #[source]
        source: FrameError,
    },

    /// No response arrived within the request timeout.
    #[error("request timed out after {timeout:?}, id: {id}, method: {method}")]
    Timeout {
        id: u32,
        method: String,
        timeout: Duration,
    },

    /// The worker explicitly rejected the request.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The worker answered with neither `accepted` nor `error`.
    #[error("response is neither accepted nor rejected, id: {id}, method: {method}")]
    MalformedResponse { id: u32, method: String },

    /// The id is still held by an earlier request that has not completed.
    #[error("request id {0} is still pending")]
    IdInUse(u32),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level error while establishing the channel.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ChannelError {
    /// Whether the error comes from channel closure, before or during the request.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ChannelError::Closed | ChannelError::ClosedWhilePending { .. }
        )
    }

    /// The worker's rejection, if this is one.
    pub fn worker_error(&self) -> Option<&WorkerError> {
        match self {
            ChannelError::Worker(err) => Some(err),
            _ => None,
        }
    }
}

/// Category of a worker-side rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    /// The caller supplied invalid input (`TypeError` on the wire).
    Validation,
    /// Any other worker failure.
    Generic,
}

impl WorkerErrorKind {
    /// Map the wire `error` string onto a kind.
    pub fn from_wire(error: &str) -> Self {
        match error {
            "TypeError" => WorkerErrorKind::Validation,
            _ => WorkerErrorKind::Generic,
        }
    }
}

impl fmt::Display for WorkerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErrorKind::Validation => f.write_str("validation"),
            WorkerErrorKind::Generic => f.write_str("worker"),
        }
    }
}

/// A rejection reported by the worker, with its human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {reason}")]
pub struct WorkerError {
    pub kind: WorkerErrorKind,
    pub reason: String,
}

impl WorkerError {
    pub fn new(kind: WorkerErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind == WorkerErrorKind::Validation
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_error_maps_to_validation() {
        assert_eq!(
            WorkerErrorKind::from_wire("TypeError"),
            WorkerErrorKind::Validation
        );
        assert_eq!(WorkerErrorKind::from_wire("Error"), WorkerErrorKind::Generic);
        assert_eq!(WorkerErrorKind::from_wire(""), WorkerErrorKind::Generic);
    }

    #[test]
    fn worker_error_display_carries_reason() {
        let err = ChannelError::from(WorkerError::new(WorkerErrorKind::Validation, "bad param"));
        assert_eq!(err.to_string(), "validation error: bad param");
        assert!(err.worker_error().is_some_and(WorkerError::is_validation));
        assert!(!err.is_closed());
    }

    #[test]
    fn closed_variants_are_detected() {
        assert!(ChannelError::Closed.is_closed());
        assert!(ChannelError::ClosedWhilePending {
            id: 3,
            method: "dump".to_string()
        }
        .is_closed());
        assert!(!ChannelError::IdInUse(3).is_closed());
    }
}
