//! Role-aware dispatch over the session and exchange machines.

use bytes::Bytes;

use super::{ExchangeMachine, SessionMachine};
use crate::{
    error::ProtocolViolation,
    message::{HttpReqHead, HttpResHead, Message, MountPoint},
    role::ConnectionRole,
};

/// Side effect requested by an accepted transition.
///
/// Machines never touch shared state themselves; the connection owner
/// applies effects to the registry, the band pool, or the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// An `IAm` established the connection's identity.
    Authenticate {
        /// Role announced by the peer.
        role: ConnectionRole,
        /// Session identifier the peer presented (empty for new cells).
        uuid: String,
    },
    /// The queen's `Accept` was observed.
    Accepted {
        /// Issued session identifier.
        uuid: String,
    },
    /// The session claims a mount.
    RegisterMount(MountPoint),
    /// The session gives up a mount.
    ReleaseMount(MountPoint),
    /// The cell should open this many additional bands.
    OpenBands(u32),
    /// All bands of the session must be closed.
    CloseBands,
    /// A request exchange began.
    BeginRequest(Box<HttpReqHead>),
    /// A request body chunk arrived.
    RequestChunk(Bytes),
    /// The request was fully delivered.
    RequestComplete,
    /// The response began.
    BeginResponse(HttpResHead),
    /// A response body chunk arrived.
    ResponseChunk(Bytes),
    /// The exchange completed; the band is idle.
    ExchangeComplete,
}

/// Identity established by a connection's opening `IAm`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hello {
    /// Role the connection plays from now on.
    pub role: ConnectionRole,
    /// Session identifier presented by the peer (empty for new cells).
    pub uuid: String,
}

/// Validate the first frame of a freshly opened connection.
///
/// # Errors
///
/// Returns [`ProtocolViolation::NotAuthenticated`] unless `message` is an
/// `IAm`, and [`ProtocolViolation::UnknownRole`] if the `IAm` names no role.
pub fn accept_hello(message: &Message) -> Result<Hello, ProtocolViolation> {
    match message {
        Message::IAm(iam) => Ok(Hello {
            role: iam.role()?,
            uuid: iam.uuid.clone(),
        }),
        other => Err(ProtocolViolation::NotAuthenticated { kind: other.kind() }),
    }
}

/// State of one connection, selected by its role.
#[derive(Clone, Debug)]
pub enum ConnectionMachine {
    /// Control connection.
    Cell(SessionMachine),
    /// Data connection.
    Band(ExchangeMachine),
}

impl ConnectionMachine {
    /// A machine for a new connection of `role`.
    #[must_use]
    pub fn new(role: ConnectionRole) -> Self {
        match role {
            ConnectionRole::Cell => Self::Cell(SessionMachine::new()),
            ConnectionRole::Band => Self::Band(ExchangeMachine::new()),
        }
    }

    /// Role of the connection.
    #[must_use]
    pub fn role(&self) -> ConnectionRole {
        match self {
            Self::Cell(_) => ConnectionRole::Cell,
            Self::Band(_) => ConnectionRole::Band,
        }
    }

    /// Name of the current state, for logs.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Cell(machine) => machine.state().name(),
            Self::Band(machine) => machine.state().name(),
        }
    }

    /// Validate `message` against the role and state, then apply it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::IllegalForRole`] when the role forbids the
    /// kind, or whichever violation the underlying machine raises.
    pub fn on_frame(&mut self, message: &Message) -> Result<Vec<Effect>, ProtocolViolation> {
        self.role().check(message.kind())?;
        match self {
            Self::Cell(machine) => machine.on_frame(message),
            Self::Band(machine) => machine.on_frame(message),
        }
    }
}
