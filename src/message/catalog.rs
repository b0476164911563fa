//! The message catalog.
//!
//! One [`CatalogEntry`] per [`FrameKind`] records the payload shape, the
//! peer that sends it, and, for structured payloads, the JSON field schema.
//! Both the encode and decode paths consult this table; adding a kind means
//! adding an entry here and a variant to [`Message`](super::Message).

use crate::{kind::FrameKind, role::Peer};

/// How the bytes following the tag are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    /// No bytes follow the tag.
    Empty,
    /// Opaque bytes passed through verbatim.
    Raw,
    /// A JSON object with the fields listed in the entry's schema.
    Structured,
}

/// Semantic type of a structured field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// Connection role number (`0` cell, `1` band).
    Role,
    /// UTF-8 string.
    Text,
    /// Unsigned integer.
    Integer,
    /// Object mapping a name to an ordered list of strings.
    MultiMap,
}

/// One field of a structured payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// JSON object key.
    pub name: &'static str,
    /// Semantic type of the value.
    pub ty: FieldType,
    /// Whether decoding fails when the key is absent.
    pub required: bool,
}

const fn required(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: true,
    }
}

const fn optional(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: false,
    }
}

/// Catalog entry describing a single kind.
#[derive(Clone, Copy, Debug)]
pub struct CatalogEntry {
    /// Kind described by this entry.
    pub kind: FrameKind,
    /// Payload shape.
    pub shape: PayloadShape,
    /// Peer that sends this kind.
    pub sender: Peer,
    /// Field schema; empty unless the shape is [`PayloadShape::Structured`].
    pub fields: &'static [FieldSpec],
}

const I_AM_FIELDS: &[FieldSpec] = &[
    required("connKind", FieldType::Role),
    required("uuid", FieldType::Text),
];

const ACCEPT_FIELDS: &[FieldSpec] = &[required("uuid", FieldType::Text)];

const MOUNT_FIELDS: &[FieldSpec] = &[
    required("host", FieldType::Text),
    required("path", FieldType::Text),
];

const NEED_BAND_FIELDS: &[FieldSpec] = &[required("count", FieldType::Integer)];

const REQ_HEAD_FIELDS: &[FieldSpec] = &[
    optional("remoteAddrReal", FieldType::Text),
    required("remoteAddr", FieldType::Text),
    required("method", FieldType::Text),
    required("scheme", FieldType::Text),
    required("host", FieldType::Text),
    required("port", FieldType::Integer),
    required("path", FieldType::Text),
    optional("fragment", FieldType::Text),
    optional("query", FieldType::MultiMap),
    required("proto", FieldType::Text),
    required("protoMajor", FieldType::Integer),
    required("protoMinor", FieldType::Integer),
    optional("headers", FieldType::MultiMap),
    optional("form", FieldType::MultiMap),
];

const RES_HEAD_FIELDS: &[FieldSpec] = &[
    required("statusCode", FieldType::Integer),
    optional("headers", FieldType::MultiMap),
];

/// The full catalog in tag order.
pub const CATALOG: [CatalogEntry; 11] = [
    CatalogEntry {
        kind: FrameKind::IAm,
        shape: PayloadShape::Structured,
        sender: Peer::Cell,
        fields: I_AM_FIELDS,
    },
    CatalogEntry {
        kind: FrameKind::Accept,
        shape: PayloadShape::Structured,
        sender: Peer::Queen,
        fields: ACCEPT_FIELDS,
    },
    CatalogEntry {
        kind: FrameKind::Mount,
        shape: PayloadShape::Structured,
        sender: Peer::Cell,
        fields: MOUNT_FIELDS,
    },
    CatalogEntry {
        kind: FrameKind::Unmount,
        shape: PayloadShape::Structured,
        sender: Peer::Cell,
        fields: MOUNT_FIELDS,
    },
    CatalogEntry {
        kind: FrameKind::NeedBand,
        shape: PayloadShape::Structured,
        sender: Peer::Queen,
        fields: NEED_BAND_FIELDS,
    },
    CatalogEntry {
        kind: FrameKind::HttpReqHead,
        shape: PayloadShape::Structured,
        sender: Peer::Queen,
        fields: REQ_HEAD_FIELDS,
    },
    CatalogEntry {
        kind: FrameKind::HttpReqBody,
        shape: PayloadShape::Raw,
        sender: Peer::Queen,
        fields: &[],
    },
    CatalogEntry {
        kind: FrameKind::HttpReqEnd,
        shape: PayloadShape::Empty,
        sender: Peer::Queen,
        fields: &[],
    },
    CatalogEntry {
        kind: FrameKind::HttpResHead,
        shape: PayloadShape::Structured,
        sender: Peer::Cell,
        fields: RES_HEAD_FIELDS,
    },
    CatalogEntry {
        kind: FrameKind::HttpResBody,
        shape: PayloadShape::Raw,
        sender: Peer::Cell,
        fields: &[],
    },
    CatalogEntry {
        kind: FrameKind::HttpResEnd,
        shape: PayloadShape::Empty,
        sender: Peer::Cell,
        fields: &[],
    },
];

/// Look up the catalog entry for `kind`.
#[must_use]
pub fn entry(kind: FrameKind) -> &'static CatalogEntry {
    let index = match kind {
        FrameKind::IAm => 0,
        FrameKind::Accept => 1,
        FrameKind::Mount => 2,
        FrameKind::Unmount => 3,
        FrameKind::NeedBand => 4,
        FrameKind::HttpReqHead => 5,
        FrameKind::HttpReqBody => 6,
        FrameKind::HttpReqEnd => 7,
        FrameKind::HttpResHead => 8,
        FrameKind::HttpResBody => 9,
        FrameKind::HttpResEnd => 10,
    };
    &CATALOG[index]
}
