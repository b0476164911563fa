//! Tag-prefixed frame codec.
//!
//! A frame is a single kind tag followed by the payload bytes. There is no
//! length prefix and no delimiter: frame boundaries are the transport's
//! business (see [`crate::codec`]). Splitting a frame performs no payload
//! validation; the [`message`](crate::message) catalog does that.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::{HiveError, ProtocolViolation, Result},
    kind::FrameKind,
};

/// A frame split into its tag and untouched payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// Leading tag byte.
    pub tag: u8,
    /// Remaining bytes, unchanged.
    pub payload: Bytes,
}

impl RawFrame {
    /// Resolve the tag against the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::UnknownKind`] for tags not in the catalog.
    pub fn kind(&self) -> std::result::Result<FrameKind, ProtocolViolation> {
        FrameKind::try_from(self.tag)
    }
}

/// Split a frame into its tag and payload.
///
/// The payload is a zero-copy slice of `bytes`.
///
/// # Errors
///
/// Returns [`HiveError::MalformedFrame`] if `bytes` is empty.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use hivewire::frame::decode_frame;
///
/// let frame = decode_frame(Bytes::from_static(b"\x31chunk")).expect("non-empty frame");
/// assert_eq!(frame.tag, 0x31);
/// assert_eq!(&frame.payload[..], b"chunk");
/// ```
pub fn decode_frame(mut bytes: Bytes) -> Result<RawFrame> {
    if bytes.is_empty() {
        return Err(HiveError::MalformedFrame);
    }
    let payload = bytes.split_off(1);
    Ok(RawFrame {
        tag: bytes[0],
        payload,
    })
}

/// Build a frame from a tag and payload.
#[must_use]
pub fn encode_frame(tag: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(tag);
    buf.put_slice(payload);
    buf.freeze()
}
