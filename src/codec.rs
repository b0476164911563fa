//! Transport framing for protocol messages.
//!
//! The protocol frame (tag plus payload) carries no length of its own, so a
//! byte stream needs an outer framing layer. [`MessageCodec`] wraps
//! `tokio_util`'s [`LengthDelimitedCodec`] (4-byte big-endian length prefix)
//! and converts each delimited frame to and from a [`Message`].
//!
//! # Examples
//!
//! ```
//! use bytes::BytesMut;
//! use hivewire::{
//!     codec::MessageCodec,
//!     message::{Message, NeedBand},
//! };
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut codec = MessageCodec::default();
//! let mut buf = BytesMut::new();
//! codec
//!     .encode(Message::NeedBand(NeedBand { count: 2 }), &mut buf)
//!     .expect("encode");
//! let decoded = codec.decode(&mut buf).expect("decode").expect("complete frame");
//! assert_eq!(decoded, Message::NeedBand(NeedBand { count: 2 }));
//! ```

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed, LengthDelimitedCodec};

use crate::{
    error::{HiveError, Result},
    message::Message,
};

/// Minimum frame length in bytes.
///
/// Frame lengths passed to codec constructors are clamped to at least this
/// value so that every catalog message fits.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
///
/// Frame lengths passed to codec constructors are clamped to at most this
/// value to prevent unbounded memory allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Default maximum frame length (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Length prefix header size (4 bytes for big-endian u32).
pub const LENGTH_HEADER_SIZE: usize = 4;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Length-delimited codec producing and consuming [`Message`]s.
#[derive(Debug)]
pub struct MessageCodec {
    inner: LengthDelimitedCodec,
    max_frame_length: usize,
}

impl MessageCodec {
    /// Construct a codec accepting frames up to `max_frame_length` bytes.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        let max_frame_length = clamp_frame_length(max_frame_length);
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_length)
                .new_codec(),
            max_frame_length,
        }
    }

    /// Return the maximum frame length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for MessageCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = HiveError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.inner.decode(src)? {
            Some(frame) => Message::from_bytes(frame.freeze()).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Clean close: no data remaining at frame boundary
        if src.is_empty() {
            return Ok(None);
        }
        match self.inner.decode_eof(src) {
            Ok(Some(frame)) => Message::from_bytes(frame.freeze()).map(Some),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(e.into()),
            Ok(None) | Err(_) => Err(premature_eof(src.len()).into()),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = HiveError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let frame = item.encode()?;
        self.inner.encode(frame, dst)?;
        Ok(())
    }
}

fn premature_eof(bytes_received: usize) -> io::Error {
    tracing::debug!(bytes_received, "connection closed mid-frame");
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("connection closed with {bytes_received} bytes of an incomplete frame"),
    )
}

/// A byte stream driven as a sequence of [`Message`]s.
pub type MessageStream<T> = Framed<T, MessageCodec>;

/// Wrap `io` in a [`MessageCodec`] accepting frames up to `max_frame_length`.
pub fn framed<T>(io: T, max_frame_length: usize) -> MessageStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, MessageCodec::new(max_frame_length))
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes};
    use futures::{SinkExt, StreamExt};
    use rstest::rstest;

    use super::*;
    use crate::message::{Accept, HttpResHead};

    #[rstest]
    #[case(0, MIN_FRAME_LENGTH)]
    #[case(4096, 4096)]
    #[case(usize::MAX, MAX_FRAME_LENGTH)]
    fn frame_length_is_clamped(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(MessageCodec::new(requested).max_frame_length(), expected);
    }

    #[test]
    fn frames_are_length_prefixed() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::HttpResEnd, &mut buf)
            .expect("encode end marker");
        assert_eq!(&buf[..], &[0, 0, 0, 1, 0x3A]);
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::from(&[0, 0, 0, 3, 0x39, b'o'][..]);
        assert!(codec.decode(&mut buf).expect("no error").is_none());
        buf.put_u8(b'k');
        assert_eq!(
            codec.decode(&mut buf).expect("no error"),
            Some(Message::HttpResBody(Bytes::from_static(b"ok")))
        );
    }

    #[test]
    fn zero_length_frame_is_malformed() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::from(&[0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(HiveError::MalformedFrame)
        ));
    }

    #[test]
    fn eof_mid_frame_is_unexpected() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::from(&[0, 0, 0, 9, 0x39][..]);
        let err = codec.decode_eof(&mut buf).expect_err("truncated frame");
        assert!(err.is_disconnect());
    }

    #[test]
    fn eof_at_boundary_is_clean() {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).expect("clean close").is_none());
    }

    #[tokio::test]
    async fn messages_cross_a_duplex_stream() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = framed(client, 1024);
        let mut server = framed(server, 1024);

        client
            .send(Message::Accept(Accept {
                uuid: "id".to_owned(),
            }))
            .await
            .expect("send accept");
        client
            .send(HttpResHead::new(404).into())
            .await
            .expect("send head");
        drop(client);

        let first = server.next().await.expect("first frame").expect("decodes");
        assert_eq!(first.kind(), crate::kind::FrameKind::Accept);
        let second = server.next().await.expect("second frame").expect("decodes");
        assert_eq!(second, Message::HttpResHead(HttpResHead::new(404)));
        assert!(server.next().await.is_none());
    }
}
