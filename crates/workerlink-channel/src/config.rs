use std::time::Duration;

use workerlink_frame::DEFAULT_MAX_PAYLOAD;

/// Default time a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime configuration for a [`Channel`](crate::Channel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Timeout applied by [`Channel::request`](crate::Channel::request). Default: 3 s.
    pub request_timeout: Duration,
    /// Largest serialized request accepted. Default: 4 MiB.
    pub max_payload_size: usize,
    /// Requests that may wait for the writer at once. Default: 1.
    pub write_queue_capacity: usize,
    /// Worker process id, attached to re-emitted diagnostic lines.
    pub worker_pid: Option<u32>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            write_queue_capacity: 1,
            worker_pid: None,
        }
    }
}

impl ChannelConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Queue capacity is clamped to at least one.
    pub fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_worker_pid(mut self, pid: u32) -> Self {
        self.worker_pid = Some(pid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_worker_limits() {
        let config = ChannelConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.max_payload_size, 4 * 1024 * 1024);
        assert_eq!(config.write_queue_capacity, 1);
        assert!(config.worker_pid.is_none());
    }

    #[test]
    fn builders_override_fields() {
        let config = ChannelConfig::default()
            .with_request_timeout(Duration::from_millis(250))
            .with_max_payload_size(1024)
            .with_write_queue_capacity(0)
            .with_worker_pid(4242);

        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.max_payload_size, 1024);
        assert_eq!(config.write_queue_capacity, 1);
        assert_eq!(config.worker_pid, Some(4242));
    }
}
