//! Frame kind tags.
//!
//! Every frame starts with a single tag byte naming its [`FrameKind`]. The
//! numeric values are part of the wire contract: they are spelled out by hand
//! and must never be renumbered, even when kinds are added or retired.

use std::fmt;

use crate::error::ProtocolViolation;

/// Family a [`FrameKind`] belongs to, selected by the tag's leading nibble.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KindFamily {
    /// `0x00..=0x0F`: authentication and setup.
    Setup,
    /// `0x10..=0x1F`: mount registration and teardown.
    Mounting,
    /// `0x20..=0x2F`: band scaling requests.
    Scaling,
    /// `0x30..=0x37`: HTTP request leg.
    Request,
    /// `0x38..=0x3F`: HTTP response leg.
    Response,
}

/// Tag identifying a logical message type.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameKind {
    /// Identity announcement opening every connection.
    IAm = 0x00,
    /// Session identifier issued by the queen.
    Accept = 0x08,
    /// Mount registration.
    Mount = 0x10,
    /// Mount removal.
    Unmount = 0x11,
    /// Request for additional bands.
    NeedBand = 0x20,
    /// HTTP request head.
    HttpReqHead = 0x30,
    /// HTTP request body chunk.
    HttpReqBody = 0x31,
    /// End of HTTP request body.
    HttpReqEnd = 0x32,
    /// HTTP response head.
    HttpResHead = 0x38,
    /// HTTP response body chunk.
    HttpResBody = 0x39,
    /// End of HTTP response body.
    HttpResEnd = 0x3A,
}

impl FrameKind {
    /// All kinds in tag order.
    pub const ALL: [FrameKind; 11] = [
        FrameKind::IAm,
        FrameKind::Accept,
        FrameKind::Mount,
        FrameKind::Unmount,
        FrameKind::NeedBand,
        FrameKind::HttpReqHead,
        FrameKind::HttpReqBody,
        FrameKind::HttpReqEnd,
        FrameKind::HttpResHead,
        FrameKind::HttpResBody,
        FrameKind::HttpResEnd,
    ];

    /// Return the wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 { self as u8 }

    /// Resolve a wire tag, returning `None` for tags absent from the catalog.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x00 => Self::IAm,
            0x08 => Self::Accept,
            0x10 => Self::Mount,
            0x11 => Self::Unmount,
            0x20 => Self::NeedBand,
            0x30 => Self::HttpReqHead,
            0x31 => Self::HttpReqBody,
            0x32 => Self::HttpReqEnd,
            0x38 => Self::HttpResHead,
            0x39 => Self::HttpResBody,
            0x3A => Self::HttpResEnd,
            _ => return None,
        })
    }

    /// Family this kind belongs to.
    #[must_use]
    pub const fn family(self) -> KindFamily {
        match self.tag() {
            0x00..=0x0F => KindFamily::Setup,
            0x10..=0x1F => KindFamily::Mounting,
            0x20..=0x2F => KindFamily::Scaling,
            0x30..=0x37 => KindFamily::Request,
            _ => KindFamily::Response,
        }
    }

    /// Human-readable name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::IAm => "IAm",
            Self::Accept => "Accept",
            Self::Mount => "Mount",
            Self::Unmount => "Unmount",
            Self::NeedBand => "NeedBand",
            Self::HttpReqHead => "HTTPReqHead",
            Self::HttpReqBody => "HTTPReqBody",
            Self::HttpReqEnd => "HTTPReqEnd",
            Self::HttpResHead => "HTTPResHead",
            Self::HttpResBody => "HTTPResBody",
            Self::HttpResEnd => "HTTPResEnd",
        }
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = ProtocolViolation;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or(ProtocolViolation::UnknownKind { tag })
    }
}

impl From<FrameKind> for u8 {
    fn from(kind: FrameKind) -> Self { kind.tag() }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.tag())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FrameKind::IAm, 0x00)]
    #[case(FrameKind::Accept, 0x08)]
    #[case(FrameKind::Mount, 0x10)]
    #[case(FrameKind::Unmount, 0x11)]
    #[case(FrameKind::NeedBand, 0x20)]
    #[case(FrameKind::HttpReqHead, 0x30)]
    #[case(FrameKind::HttpReqBody, 0x31)]
    #[case(FrameKind::HttpReqEnd, 0x32)]
    #[case(FrameKind::HttpResHead, 0x38)]
    #[case(FrameKind::HttpResBody, 0x39)]
    #[case(FrameKind::HttpResEnd, 0x3A)]
    fn tags_are_pinned(#[case] kind: FrameKind, #[case] tag: u8) {
        assert_eq!(kind.tag(), tag);
        assert_eq!(FrameKind::from_tag(tag), Some(kind));
    }

    #[test]
    fn families_follow_leading_nibble() {
        assert_eq!(FrameKind::Accept.family(), KindFamily::Setup);
        assert_eq!(FrameKind::Unmount.family(), KindFamily::Mounting);
        assert_eq!(FrameKind::NeedBand.family(), KindFamily::Scaling);
        assert_eq!(FrameKind::HttpReqEnd.family(), KindFamily::Request);
        assert_eq!(FrameKind::HttpResHead.family(), KindFamily::Response);
    }

    #[rstest]
    #[case(0x01)]
    #[case(0x3B)]
    #[case(0xFF)]
    fn unknown_tags_are_violations(#[case] tag: u8) {
        assert_eq!(
            FrameKind::try_from(tag),
            Err(ProtocolViolation::UnknownKind { tag })
        );
    }

    #[test]
    fn display_includes_tag() {
        assert_eq!(FrameKind::HttpResEnd.to_string(), "HTTPResEnd(0x3A)");
    }
}
