//! murmur-protocol: Wire framing shared by the relay server and chat clients
//!
//! A frame is a 4-byte big-endian sender id followed by the raw payload.
//! There is no length prefix: one transport read is one message.

pub mod codec;
pub mod frame;

pub use codec::{ChunkCodec, CodecError};
pub use frame::{decode, encode, Frame, SenderId, MAX_PAYLOAD_SIZE, SENDER_ID_LEN};

/// Largest frame a server ever emits (header plus one bounded read)
pub const MAX_FRAME_SIZE: usize = SENDER_ID_LEN + MAX_PAYLOAD_SIZE;
