/// Errors that can occur during payload framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing payloads.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended, either cleanly or in the middle of a payload.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the error means the stream itself is unusable.
    ///
    /// Oversized payloads and malformed input are local to the payload that
    /// caused them; every other failure means the link is gone.
    pub fn is_link_failure(&self) -> bool {
        match self {
            FrameError::PayloadTooLarge { .. } => false,
            FrameError::Io(err) => !matches!(
                err.kind(),
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData
            ),
            FrameError::ConnectionClosed => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use std::io::{Error, ErrorKind};

    use super::*;

    #[test]
    fn broken_pipe_is_link_failure() {
        assert!(FrameError::Io(Error::from(ErrorKind::BrokenPipe)).is_link_failure());
        assert!(FrameError::ConnectionClosed.is_link_failure());
    }

    #[test]
    fn payload_local_errors_keep_link() {
        assert!(!FrameError::PayloadTooLarge { size: 10, max: 4 }.is_link_failure());
        assert!(!FrameError::Io(Error::from(ErrorKind::InvalidInput)).is_link_failure());
    }
}
