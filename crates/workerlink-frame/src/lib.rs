//! Length-prefixed payload framing for worker control channels.
//!
//! Every payload on the control stream is preceded by its length as a
//! 4-byte little-endian unsigned integer. Payloads are opaque at this layer;
//! classifying them (JSON message vs. diagnostic line) happens in
//! `workerlink-channel`.
//!
//! Two flavours are provided over the same wire format:
//! - [`FrameReader`]/[`FrameWriter`] for blocking `Read`/`Write` streams;
//! - [`PayloadCodec`] for `tokio_util::codec::{FramedRead, FramedWrite}`.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_payload, encode_payload, FrameConfig, PayloadCodec, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
