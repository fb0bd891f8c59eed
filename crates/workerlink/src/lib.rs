//! Drive an external worker process over a single multiplexed control channel.
//!
//! The worker exposes nothing but a byte stream. workerlink frames that
//! stream, matches concurrent requests to their responses, routes the
//! worker's notifications to per-entity subscribers and re-emits its
//! diagnostic lines through `tracing`.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain control sockets and worker streams
//! - [`frame`]: length-prefixed payload framing, blocking and Tokio flavours
//! - [`channel`]: the request/notification multiplexer
//!
//! The most used channel types are re-exported at the crate root.

/// Re-export transport types.
pub mod transport {
    pub use workerlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use workerlink_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use workerlink_channel::*;
}

pub use workerlink_channel::{
    connect, connect_with_config, Channel, ChannelConfig, ChannelError, Notification, Response,
    SubscriptionId, TargetSelector, WorkerError, WorkerErrorKind,
};
