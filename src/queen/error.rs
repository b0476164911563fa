//! Errors raised by the queen runtime and its dispatch API.

use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::{error::HiveError, session::SessionId};

/// Errors that may occur while running the queen.
#[derive(Debug, Error)]
pub enum QueenError {
    /// Binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the queen tried to listen on.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The listener could not be inspected.
    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}

/// Why a request could not be answered by a cell.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No mount covers the request's host and path.
    #[error("no mount serves {host}{path}")]
    NoRoute {
        /// Requested host.
        host: String,
        /// Requested path.
        path: String,
    },
    /// The owning session closed before a band could be used.
    #[error("session {0} is gone")]
    SessionGone(SessionId),
    /// The cell did not provide an idle band in time.
    #[error("no band of session {0} became available")]
    NoBandAvailable(SessionId),
    /// The band failed during the exchange.
    #[error("band failed: {0}")]
    Band(#[source] HiveError),
}
