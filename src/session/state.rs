//! Session state machine for the cell control connection.

use std::collections::BTreeSet;

use super::Effect;
use crate::{
    error::ProtocolViolation,
    message::{IAm, Message, MountPoint, NeedBand},
    role::ConnectionRole,
};

/// Lifecycle of a session as seen on its cell connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Only an `IAm` is acceptable.
    Unauthenticated,
    /// Identity established; no mounts held.
    Authenticated,
    /// At least one mount is held.
    Mounted,
    /// Terminal; every frame is rejected.
    Closed,
}

impl SessionState {
    /// Name used in violation reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthenticated",
            Self::Authenticated => "Authenticated",
            Self::Mounted => "Mounted",
            Self::Closed => "Closed",
        }
    }
}

/// Session state together with the mounts the session owns.
///
/// # Examples
///
/// ```
/// use hivewire::{
///     message::{IAm, Message, MountPoint},
///     session::{SessionMachine, SessionState},
/// };
///
/// let mut session = SessionMachine::new();
/// session.on_frame(&Message::IAm(IAm::cell())).expect("first IAm");
/// session
///     .on_frame(&Message::Mount(MountPoint::new("example.com", "/")))
///     .expect("mount after authentication");
/// assert_eq!(session.state(), SessionState::Mounted);
/// assert!(session.on_frame(&Message::IAm(IAm::cell())).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct SessionMachine {
    state: SessionState,
    accepted: bool,
    mounts: BTreeSet<MountPoint>,
}

impl Default for SessionMachine {
    fn default() -> Self { Self::new() }
}

impl SessionMachine {
    /// A machine awaiting its `IAm`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            accepted: false,
            mounts: BTreeSet::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState { self.state }

    /// Whether the queen's `Accept` has been observed.
    #[must_use]
    pub fn is_accepted(&self) -> bool { self.accepted }

    /// Mounts currently owned by the session.
    pub fn mounts(&self) -> impl Iterator<Item = &MountPoint> { self.mounts.iter() }

    /// Apply a frame travelling over the cell connection.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] when the frame is not acceptable in
    /// the current state. The machine is left unchanged.
    pub fn on_frame(&mut self, message: &Message) -> Result<Vec<Effect>, ProtocolViolation> {
        let kind = message.kind();
        if self.state == SessionState::Closed {
            return Err(ProtocolViolation::SessionClosed { kind });
        }
        ConnectionRole::Cell.check(kind)?;

        match (self.state, message) {
            (SessionState::Unauthenticated, Message::IAm(iam)) => self.authenticate(iam),
            (SessionState::Unauthenticated, _) => Err(ProtocolViolation::NotAuthenticated { kind }),
            (_, Message::IAm(_)) => Err(ProtocolViolation::DuplicateIAm),
            (_, Message::Accept(_)) if self.accepted => Err(ProtocolViolation::DuplicateAccept),
            (_, Message::Accept(accept)) => {
                self.accepted = true;
                Ok(vec![Effect::Accepted {
                    uuid: accept.uuid.clone(),
                }])
            }
            (_, Message::Mount(mount)) => Ok(self.mount(mount)),
            (_, Message::Unmount(mount)) => self.unmount(mount),
            (_, Message::NeedBand(NeedBand { count: 0 })) => {
                Err(ProtocolViolation::InvalidBandCount { count: 0 })
            }
            (_, Message::NeedBand(NeedBand { count })) => Ok(vec![Effect::OpenBands(*count)]),
            (state, _) => Err(ProtocolViolation::UnexpectedFrame {
                kind,
                state: state.name(),
            }),
        }
    }

    /// Close the session, releasing every mount it owns.
    ///
    /// Closing an already closed session yields no effects.
    pub fn close(&mut self) -> Vec<Effect> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }
        self.state = SessionState::Closed;
        let mut effects: Vec<Effect> = std::mem::take(&mut self.mounts)
            .into_iter()
            .map(Effect::ReleaseMount)
            .collect();
        effects.push(Effect::CloseBands);
        effects
    }

    fn authenticate(&mut self, iam: &IAm) -> Result<Vec<Effect>, ProtocolViolation> {
        match iam.role()? {
            ConnectionRole::Cell => {
                self.state = SessionState::Authenticated;
                Ok(vec![Effect::Authenticate {
                    role: ConnectionRole::Cell,
                    uuid: iam.uuid.clone(),
                }])
            }
            found => Err(ProtocolViolation::RoleMismatch {
                expected: ConnectionRole::Cell,
                found,
            }),
        }
    }

    fn mount(&mut self, mount: &MountPoint) -> Vec<Effect> {
        self.state = SessionState::Mounted;
        if self.mounts.insert(mount.clone()) {
            vec![Effect::RegisterMount(mount.clone())]
        } else {
            Vec::new()
        }
    }

    fn unmount(&mut self, mount: &MountPoint) -> Result<Vec<Effect>, ProtocolViolation> {
        if !self.mounts.remove(mount) {
            return Err(ProtocolViolation::NotMounted {
                host: mount.host.clone(),
                path: mount.path.clone(),
            });
        }
        if self.mounts.is_empty() {
            self.state = SessionState::Authenticated;
        }
        Ok(vec![Effect::ReleaseMount(mount.clone())])
    }
}
