//! Byte-stream plumbing between a host process and its worker.
//!
//! The worker's control channel is a single duplex byte stream. On Unix this
//! is a Unix domain socket, either bound by the host and accepted from the
//! worker or bound by the worker and connected to by the host. Everything in
//! `workerlink-frame` and `workerlink-channel` sits on top of the
//! [`WorkerStream`] type provided here.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{PeerCredentials, WorkerStream};

#[cfg(unix)]
pub use uds::ControlSocket;
