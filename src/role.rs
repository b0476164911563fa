//! Connection roles and the kinds each role may carry.
//!
//! A cell opens one control connection ([`ConnectionRole::Cell`]) and any
//! number of data connections ([`ConnectionRole::Band`]). The role is fixed by
//! the connection's opening `IAm` and never changes afterwards.

use std::fmt;

use crate::{error::ProtocolViolation, kind::FrameKind, message::catalog};

/// Role a connection plays for its session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// Control channel: setup, mounting and band scaling.
    Cell,
    /// Data channel: one HTTP exchange at a time.
    Band,
}

const CELL_KINDS: [FrameKind; 5] = [
    FrameKind::IAm,
    FrameKind::Accept,
    FrameKind::Mount,
    FrameKind::Unmount,
    FrameKind::NeedBand,
];

const BAND_KINDS: [FrameKind; 6] = [
    FrameKind::HttpReqHead,
    FrameKind::HttpReqBody,
    FrameKind::HttpReqEnd,
    FrameKind::HttpResHead,
    FrameKind::HttpResBody,
    FrameKind::HttpResEnd,
];

impl ConnectionRole {
    /// Wire number carried in the `connKind` field of an `IAm`.
    #[must_use]
    pub const fn conn_kind(self) -> i64 {
        match self {
            Self::Cell => 0x0,
            Self::Band => 0x1,
        }
    }

    /// Resolve a `connKind` number.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::UnknownRole`] for numbers other than 0 and 1.
    pub const fn from_conn_kind(conn_kind: i64) -> Result<Self, ProtocolViolation> {
        match conn_kind {
            0x0 => Ok(Self::Cell),
            0x1 => Ok(Self::Band),
            _ => Err(ProtocolViolation::UnknownRole { conn_kind }),
        }
    }

    /// Kinds that may legally travel over a connection of this role once the
    /// role is established.
    #[must_use]
    pub fn legal_kinds(self) -> &'static [FrameKind] {
        match self {
            Self::Cell => &CELL_KINDS,
            Self::Band => &BAND_KINDS,
        }
    }

    /// Whether `kind` may travel over a connection of this role.
    #[must_use]
    pub fn permits(self, kind: FrameKind) -> bool { self.legal_kinds().contains(&kind) }

    /// Reject `kind` unless this role permits it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::IllegalForRole`] when the role forbids the kind.
    pub fn check(self, kind: FrameKind) -> Result<(), ProtocolViolation> {
        if self.permits(kind) {
            Ok(())
        } else {
            Err(ProtocolViolation::IllegalForRole { kind, role: self })
        }
    }
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cell => "cell",
            Self::Band => "band",
        })
    }
}

/// One of the two processes at either end of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Peer {
    /// The coordinator routing HTTP traffic.
    Queen,
    /// A backend process serving mounts.
    Cell,
}

impl Peer {
    /// The process at the other end of the connection.
    #[must_use]
    pub const fn remote(self) -> Self {
        match self {
            Self::Queen => Self::Cell,
            Self::Cell => Self::Queen,
        }
    }

    /// Reject an inbound `kind` this peer is itself the sender of.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::WrongDirection`] when the remote side has
    /// no business sending `kind`.
    pub fn check_inbound(self, kind: FrameKind) -> Result<(), ProtocolViolation> {
        if catalog::entry(kind).sender == self.remote() {
            Ok(())
        } else {
            Err(ProtocolViolation::WrongDirection { kind })
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn cell_connection_rejects_request_head() {
        assert_eq!(
            ConnectionRole::Cell.check(FrameKind::HttpReqHead),
            Err(ProtocolViolation::IllegalForRole {
                kind: FrameKind::HttpReqHead,
                role: ConnectionRole::Cell,
            })
        );
    }

    #[test]
    fn band_connection_rejects_mount() {
        assert_eq!(
            ConnectionRole::Band.check(FrameKind::Mount),
            Err(ProtocolViolation::IllegalForRole {
                kind: FrameKind::Mount,
                role: ConnectionRole::Band,
            })
        );
    }

    #[test]
    fn roles_partition_the_catalog() {
        for kind in FrameKind::ALL {
            assert_ne!(
                ConnectionRole::Cell.permits(kind),
                ConnectionRole::Band.permits(kind),
                "{kind} must belong to exactly one role"
            );
        }
    }

    #[rstest]
    #[case(0, Ok(ConnectionRole::Cell))]
    #[case(1, Ok(ConnectionRole::Band))]
    #[case(2, Err(ProtocolViolation::UnknownRole { conn_kind: 2 }))]
    #[case(256, Err(ProtocolViolation::UnknownRole { conn_kind: 256 }))]
    #[case(-1, Err(ProtocolViolation::UnknownRole { conn_kind: -1 }))]
    fn conn_kind_numbers(
        #[case] raw: i64,
        #[case] expected: Result<ConnectionRole, ProtocolViolation>,
    ) {
        assert_eq!(ConnectionRole::from_conn_kind(raw), expected);
    }

    #[rstest]
    #[case(Peer::Queen, FrameKind::IAm, true)]
    #[case(Peer::Queen, FrameKind::HttpResBody, true)]
    #[case(Peer::Queen, FrameKind::NeedBand, false)]
    #[case(Peer::Cell, FrameKind::NeedBand, true)]
    #[case(Peer::Cell, FrameKind::Accept, true)]
    #[case(Peer::Cell, FrameKind::Mount, false)]
    fn inbound_direction(#[case] local: Peer, #[case] kind: FrameKind, #[case] allowed: bool) {
        assert_eq!(local.check_inbound(kind).is_ok(), allowed);
    }
}
