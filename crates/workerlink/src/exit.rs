use std::fmt;
use std::io;

use workerlink_channel::ChannelError;
use workerlink_frame::FrameError;
use workerlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

/// Map a channel error onto an exit code.
///
/// Worker rejections of type `TypeError` are input errors (60); other
/// rejections are plain failures (1).
pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::WriteFailed { source, .. } => frame_error(context, source),
        ChannelError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ChannelError::Worker(ref rejection) if rejection.is_validation() => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ChannelError::RequestTooLarge { .. } | ChannelError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ChannelError::IdInUse(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
        ChannelError::Worker(_)
        | ChannelError::Closed
        | ChannelError::ClosedWhilePending { .. }
        | ChannelError::MalformedResponse { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use workerlink_channel::{WorkerError, WorkerErrorKind};

    use super::*;

    #[test]
    fn validation_rejection_is_data_invalid() {
        let err = ChannelError::from(WorkerError::new(WorkerErrorKind::Validation, "bad param"));
        let cli = channel_error("request failed", err);
        assert_eq!(cli.code, DATA_INVALID);
        assert_eq!(cli.message, "request failed: validation error: bad param");
    }

    #[test]
    fn generic_rejection_is_failure() {
        let err = ChannelError::from(WorkerError::new(WorkerErrorKind::Generic, "boom"));
        assert_eq!(channel_error("request failed", err).code, FAILURE);
    }

    #[test]
    fn timeout_maps_to_124() {
        let err = ChannelError::Timeout {
            id: 1,
            method: "dump".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(channel_error("request failed", err).code, TIMEOUT);
    }

    #[test]
    fn missing_socket_is_transport_error() {
        let err = ChannelError::Transport(TransportError::Connect {
            path: "/tmp/missing.sock".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(channel_error("connect failed", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn write_failure_uses_frame_mapping() {
        let err = ChannelError::WriteFailed {
            id: 1,
            method: "dump".to_string(),
            source: FrameError::ConnectionClosed,
        };
        assert_eq!(channel_error("request failed", err).code, FAILURE);
    }
}
