//! Frame layout and the encode/decode pair

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::CodecError;

/// Size of the sender id header in bytes
pub const SENDER_ID_LEN: usize = 4;

/// Maximum payload carried by one frame (one bounded server read)
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Server-assigned identity of the connection a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SenderId(u32);

impl SenderId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for SenderId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One wire unit: sender id plus payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    sender: SenderId,
    payload: Bytes,
}

impl Frame {
    pub fn new(sender: SenderId, payload: impl Into<Bytes>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }

    pub fn sender(&self) -> SenderId {
        self.sender
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_parts(self) -> (SenderId, Bytes) {
        (self.sender, self.payload)
    }

    /// Serialize to `sender (BE u32) || payload`
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        encode(self.sender, &self.payload)
    }
}

/// Encode a sender id and payload into wire bytes
pub fn encode(sender: SenderId, payload: &[u8]) -> Result<Bytes, CodecError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut dst = BytesMut::with_capacity(SENDER_ID_LEN + payload.len());
    dst.put_u32(sender.value());
    dst.put_slice(payload);
    Ok(dst.freeze())
}

/// Decode wire bytes received in a single read
///
/// Everything after the 4-byte header is payload.
pub fn decode(src: &[u8]) -> Result<Frame, CodecError> {
    if src.len() < SENDER_ID_LEN {
        return Err(CodecError::MalformedFrame { len: src.len() });
    }

    let (header, payload) = src.split_at(SENDER_ID_LEN);
    let sender = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    Ok(Frame::new(
        SenderId::new(sender),
        Bytes::copy_from_slice(payload),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let bytes = encode(SenderId::new(7), b"hi").unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 7, b'h', b'i']);
    }

    #[test]
    fn test_sender_id_is_big_endian() {
        let bytes = encode(SenderId::new(0x0102_0304), b"").unwrap();
        assert_eq!(&bytes[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_roundtrip_boundaries() {
        let max_payload = vec![b'x'; MAX_PAYLOAD_SIZE];
        let cases: [(u32, &[u8]); 4] = [
            (0, &b""[..]),
            (u32::MAX, &b"hello"[..]),
            (42, max_payload.as_slice()),
            (1, &b"\x00\x01\xff"[..]),
        ];

        for (id, payload) in cases {
            let frame = decode(&encode(SenderId::new(id), payload).unwrap()).unwrap();
            assert_eq!(frame.sender().value(), id);
            assert_eq!(&frame.payload()[..], payload);
        }
    }

    #[test]
    fn test_decode_too_short() {
        for len in 0..SENDER_ID_LEN {
            let result = decode(&vec![0u8; len]);
            assert!(matches!(result, Err(CodecError::MalformedFrame { len: l }) if l == len));
        }
    }

    #[test]
    fn test_decode_header_only() {
        let frame = decode(&[0, 0, 0, 9]).unwrap();
        assert_eq!(frame.sender(), SenderId::new(9));
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_encode_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let result = encode(SenderId::new(1), &payload);
        assert!(matches!(
            result,
            Err(CodecError::PayloadTooLarge { size, max })
                if size == MAX_PAYLOAD_SIZE + 1 && max == MAX_PAYLOAD_SIZE
        ));
    }

    #[test]
    fn test_frame_encode_matches_free_fn() {
        let frame = Frame::new(SenderId::new(3), Bytes::from_static(b"abc"));
        assert_eq!(frame.encode().unwrap(), encode(SenderId::new(3), b"abc").unwrap());
    }

    #[test]
    fn test_sender_id_display() {
        assert_eq!(SenderId::from(12).to_string(), "12");
    }
}
