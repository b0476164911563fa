//! Canonical error and result types for the crate.
//!
//! Every error raised while decoding or validating a frame is fatal to the
//! connection that carried it. Errors are reported to the connection owner
//! and never retried here.
//!
//! # Error Categories
//!
//! - [`HiveError::MalformedFrame`]: the transport delivered a frame with no tag byte.
//! - [`HiveError::PayloadDecode`]: the tag is known but its structured payload does not parse.
//! - [`HiveError::Protocol`]: a well-formed message arrived where the role, direction, or state
//!   forbids it. Unknown tags are reported here too.
//! - [`HiveError::Io`]: the transport itself failed.

use std::io;

use thiserror::Error;

use crate::{kind::FrameKind, role::ConnectionRole};

/// A syntactically valid frame that the protocol forbids in context.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The tag byte is not present in the message catalog.
    #[error("unknown frame kind 0x{tag:02X}")]
    UnknownKind {
        /// Tag byte that was not recognised.
        tag: u8,
    },

    /// An `IAm` named a connection role that does not exist.
    #[error("unknown connection role {conn_kind}")]
    UnknownRole {
        /// Raw role number carried by the `IAm`.
        conn_kind: i64,
    },

    /// The kind is not legal on connections of this role.
    #[error("{kind} is not legal on a {role} connection")]
    IllegalForRole {
        /// Offending frame kind.
        kind: FrameKind,
        /// Role of the connection that carried it.
        role: ConnectionRole,
    },

    /// The frame travelled in the wrong direction.
    #[error("{kind} may not be sent by this peer")]
    WrongDirection {
        /// Offending frame kind.
        kind: FrameKind,
    },

    /// A frame other than `IAm` arrived before authentication.
    #[error("{kind} received before authentication")]
    NotAuthenticated {
        /// Offending frame kind.
        kind: FrameKind,
    },

    /// A second `IAm` arrived on an authenticated connection.
    #[error("connection already authenticated")]
    DuplicateIAm,

    /// A second `Accept` arrived for the same session.
    #[error("session already accepted")]
    DuplicateAccept,

    /// The `IAm` announced a role other than the connection's.
    #[error("expected a {expected} connection, peer announced {found}")]
    RoleMismatch {
        /// Role the connection was created with.
        expected: ConnectionRole,
        /// Role carried by the `IAm`.
        found: ConnectionRole,
    },

    /// A band named a session that is not live.
    #[error("no live session {uuid}")]
    UnknownSession {
        /// Session identifier the band presented.
        uuid: String,
    },

    /// An `Unmount` named a mount the session does not own.
    #[error("mount {host}{path} is not owned by this session")]
    NotMounted {
        /// Host of the mount.
        host: String,
        /// Path prefix of the mount.
        path: String,
    },

    /// A `NeedBand` asked for zero bands.
    #[error("band count must be positive, got {count}")]
    InvalidBandCount {
        /// Requested band count.
        count: u32,
    },

    /// The exchange or session state forbids this kind.
    #[error("{kind} not permitted in state {state}")]
    UnexpectedFrame {
        /// Offending frame kind.
        kind: FrameKind,
        /// Name of the state the machine was in.
        state: &'static str,
    },

    /// The session has already ended.
    #[error("{kind} received after session close")]
    SessionClosed {
        /// Offending frame kind.
        kind: FrameKind,
    },
}

/// Top-level error type exposed by `hivewire`.
#[derive(Debug, Error)]
pub enum HiveError {
    /// A zero-length frame carried no tag byte.
    #[error("malformed frame: no tag byte")]
    MalformedFrame,

    /// A structured payload failed to parse against its schema.
    #[error("failed to decode {kind} payload: {source}")]
    PayloadDecode {
        /// Kind whose payload failed to parse.
        kind: FrameKind,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A structured payload could not be serialized.
    #[error("failed to encode {kind} payload: {source}")]
    PayloadEncode {
        /// Kind whose payload failed to serialize.
        kind: FrameKind,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The message is forbidden in its context.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Transport failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl HiveError {
    /// Returns true if the error was caused by the peer going away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io(error) if matches!(
                error.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        )
    }

    /// Return the violation if this error is a protocol violation.
    #[must_use]
    pub fn as_violation(&self) -> Option<&ProtocolViolation> {
        match self {
            Self::Protocol(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Canonical result alias used by `hivewire` public APIs.
pub type Result<T> = std::result::Result<T, HiveError>;
