//! Protocol state machines.
//!
//! A cell connection runs a [`SessionMachine`]; each band runs an
//! independent [`ExchangeMachine`]. [`ConnectionMachine`] wraps either one
//! and checks role legality before applying a frame. Machines observe both
//! directions of a connection, so the sending side and the receiving side
//! validate the same sequence.
//!
//! Transitions are synchronous and either apply in full or leave the machine
//! untouched; a rejected frame is a [`ProtocolViolation`](crate::error::ProtocolViolation)
//! and the caller is expected to close the connection.

use std::{fmt, str::FromStr};

use uuid::Uuid;

mod exchange;
mod machine;
mod state;

pub use exchange::{ExchangeEvent, ExchangeMachine, ExchangeState, ExchangeTracker};
pub use machine::{ConnectionMachine, Effect, Hello, accept_hello};
pub use state::{SessionMachine, SessionState};

/// Queen-issued identifier of one connected cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Issue a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self { Self(Uuid::new_v4()) }

    /// Return the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid { &self.0 }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self { Self(value) }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_round_trip_through_text() {
        let id = SessionId::generate();
        let parsed: SessionId = id.to_string().parse().expect("hyphenated uuid parses");
        assert_eq!(parsed, id);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn garbage_is_not_a_session_id() { assert!("not-a-uuid".parse::<SessionId>().is_err()); }
}
