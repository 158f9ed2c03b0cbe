//! Read-boundary codec for the relay's inbound side
//!
//! Clients send raw bytes with no framing of their own. The server treats
//! whatever a single read delivers (capped at the payload limit) as one
//! message, so the decoder simply hands out bounded chunks.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::frame::MAX_PAYLOAD_SIZE;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {len} bytes, need at least 4 for the sender id")]
    MalformedFrame { len: usize },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Decoder yielding one bounded chunk per read
#[derive(Debug, Clone, Copy)]
pub struct ChunkCodec {
    max_chunk: usize,
}

impl ChunkCodec {
    pub fn new() -> Self {
        Self::with_max_chunk(MAX_PAYLOAD_SIZE)
    }

    /// Cap chunks at `max_chunk` bytes (clamped to 1..=MAX_PAYLOAD_SIZE)
    pub fn with_max_chunk(max_chunk: usize) -> Self {
        Self {
            max_chunk: max_chunk.clamp(1, MAX_PAYLOAD_SIZE),
        }
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let len = src.len().min(self.max_chunk);
        Ok(Some(src.split_to(len).freeze()))
    }
}
