//! Logical messages exchanged between queen and cell.
//!
//! [`Message`] is a closed sum over the catalog's kinds. Converting between a
//! message and its frame bytes is driven by the payload shape recorded in
//! [`catalog`], so shape knowledge lives in exactly one place.
//!
//! # Examples
//!
//! ```
//! use hivewire::message::{Message, MountPoint};
//!
//! let message = Message::Mount(MountPoint::new("example.com", "/api"));
//! let bytes = message.encode().expect("mount encodes");
//! assert_eq!(bytes[0], 0x10);
//! assert_eq!(Message::from_bytes(bytes).expect("mount decodes"), message);
//! ```

use bytes::Bytes;
use serde::{Serialize, de, de::DeserializeOwned};

pub mod catalog;
mod payload;

pub use catalog::{CatalogEntry, FieldSpec, FieldType, PayloadShape};
pub use payload::{Accept, HttpReqHead, HttpResHead, IAm, MountPoint, MultiMap, NeedBand};

use crate::{
    error::{HiveError, Result},
    frame::{self, RawFrame},
    kind::FrameKind,
};

/// A decoded protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Identity announcement.
    IAm(IAm),
    /// Session identifier issued by the queen.
    Accept(Accept),
    /// Mount registration.
    Mount(MountPoint),
    /// Mount removal.
    Unmount(MountPoint),
    /// Request for additional bands.
    NeedBand(NeedBand),
    /// HTTP request head.
    HttpReqHead(Box<HttpReqHead>),
    /// HTTP request body chunk.
    HttpReqBody(Bytes),
    /// End of the HTTP request body.
    HttpReqEnd,
    /// HTTP response head.
    HttpResHead(HttpResHead),
    /// HTTP response body chunk.
    HttpResBody(Bytes),
    /// End of the HTTP response body.
    HttpResEnd,
}

impl Message {
    /// Kind tag of this message.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::IAm(_) => FrameKind::IAm,
            Self::Accept(_) => FrameKind::Accept,
            Self::Mount(_) => FrameKind::Mount,
            Self::Unmount(_) => FrameKind::Unmount,
            Self::NeedBand(_) => FrameKind::NeedBand,
            Self::HttpReqHead(_) => FrameKind::HttpReqHead,
            Self::HttpReqBody(_) => FrameKind::HttpReqBody,
            Self::HttpReqEnd => FrameKind::HttpReqEnd,
            Self::HttpResHead(_) => FrameKind::HttpResHead,
            Self::HttpResBody(_) => FrameKind::HttpResBody,
            Self::HttpResEnd => FrameKind::HttpResEnd,
        }
    }

    /// Catalog entry for this message's kind.
    #[must_use]
    pub fn entry(&self) -> &'static CatalogEntry { catalog::entry(self.kind()) }

    /// Encode the message into a complete frame: tag byte then payload.
    ///
    /// # Errors
    ///
    /// Returns [`HiveError::PayloadEncode`] if a structured payload fails to
    /// serialize.
    pub fn encode(&self) -> Result<Bytes> {
        let kind = self.kind();
        let payload = match catalog::entry(kind).shape {
            PayloadShape::Empty => Bytes::new(),
            PayloadShape::Raw => self.raw_payload(),
            PayloadShape::Structured => self
                .structured_payload()
                .map_err(|source| HiveError::PayloadEncode { kind, source })?,
        };
        Ok(frame::encode_frame(kind.tag(), &payload))
    }

    /// Decode a complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`HiveError::MalformedFrame`] for an empty frame, a protocol
    /// violation for an unknown tag, and [`HiveError::PayloadDecode`] when the
    /// payload does not match the kind's shape.
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        Self::from_frame(frame::decode_frame(bytes)?)
    }

    /// Resolve a split frame into a message using the catalog.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation for an unknown tag and
    /// [`HiveError::PayloadDecode`] when the payload does not match the
    /// kind's shape.
    pub fn from_frame(frame: RawFrame) -> Result<Self> {
        let kind = frame.kind()?;
        let payload = frame.payload;
        match catalog::entry(kind).shape {
            PayloadShape::Empty if !payload.is_empty() => Err(HiveError::PayloadDecode {
                kind,
                source: <serde_json::Error as de::Error>::invalid_length(
                    payload.len(),
                    &"an empty payload",
                ),
            }),
            PayloadShape::Empty => Self::empty(kind),
            PayloadShape::Raw => Self::raw(kind, payload),
            PayloadShape::Structured => Self::structured(kind, &payload),
        }
    }

    fn raw_payload(&self) -> Bytes {
        match self {
            Self::HttpReqBody(chunk) | Self::HttpResBody(chunk) => chunk.clone(),
            _ => Bytes::new(),
        }
    }

    fn structured_payload(&self) -> serde_json::Result<Bytes> {
        fn to_json<T: Serialize>(value: &T) -> serde_json::Result<Bytes> {
            serde_json::to_vec(value).map(Bytes::from)
        }

        match self {
            Self::IAm(body) => to_json(body),
            Self::Accept(body) => to_json(body),
            Self::Mount(body) | Self::Unmount(body) => to_json(body),
            Self::NeedBand(body) => to_json(body),
            Self::HttpReqHead(body) => to_json(body),
            Self::HttpResHead(body) => to_json(body),
            _ => Ok(Bytes::new()),
        }
    }

    fn empty(kind: FrameKind) -> Result<Self> {
        match kind {
            FrameKind::HttpReqEnd => Ok(Self::HttpReqEnd),
            FrameKind::HttpResEnd => Ok(Self::HttpResEnd),
            _ => Err(shape_mismatch(kind)),
        }
    }

    fn raw(kind: FrameKind, payload: Bytes) -> Result<Self> {
        match kind {
            FrameKind::HttpReqBody => Ok(Self::HttpReqBody(payload)),
            FrameKind::HttpResBody => Ok(Self::HttpResBody(payload)),
            _ => Err(shape_mismatch(kind)),
        }
    }

    fn structured(kind: FrameKind, payload: &[u8]) -> Result<Self> {
        fn parse<T: DeserializeOwned>(kind: FrameKind, payload: &[u8]) -> Result<T> {
            serde_json::from_slice(payload)
                .map_err(|source| HiveError::PayloadDecode { kind, source })
        }

        Ok(match kind {
            FrameKind::IAm => Self::IAm(parse(kind, payload)?),
            FrameKind::Accept => Self::Accept(parse(kind, payload)?),
            FrameKind::Mount => Self::Mount(parse(kind, payload)?),
            FrameKind::Unmount => Self::Unmount(parse(kind, payload)?),
            FrameKind::NeedBand => Self::NeedBand(parse(kind, payload)?),
            FrameKind::HttpReqHead => Self::HttpReqHead(Box::new(parse(kind, payload)?)),
            FrameKind::HttpResHead => Self::HttpResHead(parse(kind, payload)?),
            _ => return Err(shape_mismatch(kind)),
        })
    }
}

/// A catalog shape with no matching [`Message`] variant.
fn shape_mismatch(kind: FrameKind) -> HiveError {
    HiveError::PayloadDecode {
        kind,
        source: <serde_json::Error as de::Error>::custom(format!(
            "catalog shape of {kind} has no message variant"
        )),
    }
}

/// Encode `message` into a complete frame.
///
/// # Errors
///
/// See [`Message::encode`].
pub fn encode_message(message: &Message) -> Result<Bytes> { message.encode() }

impl From<IAm> for Message {
    fn from(value: IAm) -> Self { Self::IAm(value) }
}

impl From<Accept> for Message {
    fn from(value: Accept) -> Self { Self::Accept(value) }
}

impl From<NeedBand> for Message {
    fn from(value: NeedBand) -> Self { Self::NeedBand(value) }
}

impl From<HttpReqHead> for Message {
    fn from(value: HttpReqHead) -> Self { Self::HttpReqHead(Box::new(value)) }
}

impl From<HttpResHead> for Message {
    fn from(value: HttpResHead) -> Self { Self::HttpResHead(value) }
}

#[cfg(test)]
mod tests;
