//! Error types for cell operations.

use std::io;

use crate::{error::HiveError, registry::MountError};

/// Errors emitted by [`Cell`](super::Cell) and [`CellSession`](super::CellSession).
#[derive(Debug, thiserror::Error)]
pub enum CellError {
    /// Opening a connection to the queen failed.
    #[error("failed to connect to queen: {0}")]
    Connect(#[source] io::Error),
    /// The queen did not answer the `IAm` in time.
    #[error("queen did not accept the session in time")]
    AcceptTimeout,
    /// The queen closed the control connection before accepting.
    #[error("connection closed before the session was accepted")]
    NotAccepted,
    /// The queen issued a session identifier that is not a UUID.
    #[error("queen issued an invalid session id {uuid:?}")]
    InvalidSessionId {
        /// Identifier as received.
        uuid: String,
    },
    /// The session is closed.
    #[error("session closed")]
    Closed,
    /// A mount operation was refused locally.
    #[error(transparent)]
    Mount(#[from] MountError),
    /// Framing, payload or protocol failure on a connection.
    #[error(transparent)]
    Wire(#[from] HiveError),
}
