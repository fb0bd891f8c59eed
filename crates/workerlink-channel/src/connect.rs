use std::path::Path;

#[cfg(unix)]
use workerlink_transport::ControlSocket;
use workerlink_transport::WorkerStream;

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::Result;

/// Connect to a worker's control socket with default configuration.
///
/// Must be called from within a Tokio runtime.
pub fn connect(path: impl AsRef<Path>) -> Result<Channel> {
    connect_with_config(path, ChannelConfig::default())
}

/// Connect to a worker's control socket.
pub fn connect_with_config(path: impl AsRef<Path>, config: ChannelConfig) -> Result<Channel> {
    #[cfg(not(unix))]
    {
        let _ = config;
        return Err(workerlink_transport::TransportError::Connect {
            path: path.as_ref().to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "worker control sockets require Unix domain sockets",
            ),
        }
        .into());
    }

    #[cfg(unix)]
    {
        let stream = ControlSocket::connect(path)?;
        from_worker_stream(stream, config)
    }
}

/// Open a channel over an already connected worker stream.
///
/// The worker pid is taken from the peer credentials when the config does
/// not carry one.
pub fn from_worker_stream(stream: WorkerStream, mut config: ChannelConfig) -> Result<Channel> {
    if config.worker_pid.is_none() {
        config.worker_pid = stream.peer_credentials().map(|creds| creds.pid);
    }

    #[cfg(unix)]
    {
        let max = config.max_payload_size;
        let (source, sink) = crate::transport::framed_unix(stream.into_tokio()?, max);
        Ok(Channel::open(source, sink, config))
    }

    #[cfg(not(unix))]
    {
        let _ = (stream, config);
        Err(workerlink_transport::TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "worker control sockets require Unix domain sockets",
        ))
        .into())
    }
}
