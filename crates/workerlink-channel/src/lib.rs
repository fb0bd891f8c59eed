//! Request/response and notification multiplexing over a worker control channel.
//!
//! A [`Channel`] carries three kinds of traffic over one framed byte stream:
//! requests the host issues and the responses matched back to them by id,
//! notifications the worker emits for its entities, and diagnostic lines the
//! worker writes from its own logging. Any number of callers may issue
//! requests concurrently; each waits for its own response, its timeout, or
//! channel closure.
//!
//! ```no_run
//! # async fn run() -> workerlink_channel::Result<()> {
//! use workerlink_channel::{connect, TargetSelector};
//!
//! let channel = connect("/tmp/worker.sock")?;
//! let target = TargetSelector::new().with("routerId", "r1");
//! let dump = channel.request("router.dump", &target, None).await?;
//! println!("{:?}", dump.data());
//!
//! channel.subscribe("r1", "workerclose", |n| println!("{}", n.event));
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod connect;
pub mod error;
pub mod message;
mod pending;
pub mod router;
pub mod transport;

pub use channel::{Channel, WORKER_LOG_TARGET};
pub use config::{ChannelConfig, DEFAULT_REQUEST_TIMEOUT};
pub use connect::{connect, connect_with_config, from_worker_stream};
pub use error::{ChannelError, Result, WorkerError, WorkerErrorKind};
pub use message::{Notification, Response, TargetSelector};
pub use router::{NotificationHandler, NotificationRouter, SubscriptionId};
#[cfg(unix)]
pub use transport::framed_unix;
pub use transport::{framed, FramedSink, FramedSource, PayloadSink, PayloadSource};
