//! The queen: accepts cells, tracks their mounts, and routes requests to them.
//!
//! A cell opens one control connection and any number of bands. The queen
//! keeps a [`SessionEntry`](crate::registry::SessionEntry) per control
//! connection and hands requests to idle bands through [`QueenHandle`].

mod backoff;
mod connection;
mod error;
mod runtime;

use std::{sync::Arc, time::Duration};

pub use backoff::BackoffConfig;
pub use error::{DispatchError, QueenError};
use tokio::time::timeout;

use crate::{
    codec::{DEFAULT_MAX_FRAME_LENGTH, clamp_frame_length},
    http::{HttpRequest, HttpResponse},
    registry::{Checkout, MountTable, SessionRegistry},
    session::SessionId,
};

/// Tunables for a [`Queen`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueenConfig {
    /// Largest frame accepted from a cell, clamped to the codec limits.
    pub max_frame_length: usize,
    /// How long a dispatch waits for a band after sending `NeedBand`.
    pub band_wait: Duration,
    /// How long a new connection may take to send its `IAm`.
    pub handshake_timeout: Duration,
    /// Accept-loop back-off.
    pub backoff: BackoffConfig,
}

impl Default for QueenConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            band_wait: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
        }
    }
}

impl QueenConfig {
    /// Clamp every field to a usable value.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_frame_length = clamp_frame_length(self.max_frame_length);
        self.band_wait = self.band_wait.max(Duration::from_millis(1));
        self.handshake_timeout = self.handshake_timeout.max(Duration::from_millis(1));
        self.backoff = self.backoff.normalized();
        self
    }
}

/// Builder for [`Queen`].
#[derive(Clone, Copy, Debug, Default)]
pub struct QueenBuilder {
    config: QueenConfig,
}

impl QueenBuilder {
    /// Largest frame accepted from a cell.
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.config.max_frame_length = length;
        self
    }

    /// How long a dispatch waits for a band to become idle.
    #[must_use]
    pub fn band_wait(mut self, wait: Duration) -> Self {
        self.config.band_wait = wait;
        self
    }

    /// How long a new connection may take to identify itself.
    #[must_use]
    pub fn handshake_timeout(mut self, limit: Duration) -> Self {
        self.config.handshake_timeout = limit;
        self
    }

    /// Back-off applied when accepting a connection fails.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Finish configuration.
    #[must_use]
    pub fn build(self) -> Queen { Queen::new(self.config) }
}

/// State shared by every connection task and every [`QueenHandle`].
#[derive(Debug, Default)]
pub(crate) struct Hive {
    pub(crate) sessions: SessionRegistry,
    pub(crate) mounts: MountTable,
}

/// The coordinator process.
///
/// # Examples
///
/// ```no_run
/// use hivewire::queen::Queen;
/// use tokio::net::TcpListener;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), hivewire::queen::QueenError> {
/// let listener = TcpListener::bind("127.0.0.1:7700").await?;
/// let queen = Queen::builder().build();
/// let handle = queen.handle();
/// tokio::spawn(queen.run(listener));
/// # drop(handle);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Queen {
    config: QueenConfig,
    hive: Arc<Hive>,
}

impl Default for Queen {
    fn default() -> Self { Self::new(QueenConfig::default()) }
}

impl Queen {
    /// Start configuring a queen.
    #[must_use]
    pub fn builder() -> QueenBuilder { QueenBuilder::default() }

    /// A queen using `config`.
    #[must_use]
    pub fn new(config: QueenConfig) -> Self {
        Self {
            config: config.normalized(),
            hive: Arc::new(Hive::default()),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &QueenConfig { &self.config }

    /// A handle for dispatching requests and inspecting the registry.
    #[must_use]
    pub fn handle(&self) -> QueenHandle {
        QueenHandle {
            hive: Arc::clone(&self.hive),
            band_wait: self.config.band_wait,
        }
    }
}

/// Cheaply cloneable entry point for routing requests to cells.
#[derive(Clone, Debug)]
pub struct QueenHandle {
    hive: Arc<Hive>,
    band_wait: Duration,
}

impl QueenHandle {
    /// Forward `request` to the cell owning its mount and await the response.
    ///
    /// Uses an idle band when one exists. Otherwise asks the cell for one more
    /// band, unless another dispatch is already waiting on the session, and
    /// waits up to the configured band wait for any band of the session to
    /// become idle.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoRoute`] when no mount matches.
    /// - [`DispatchError::SessionGone`] when the owning session closes first.
    /// - [`DispatchError::NoBandAvailable`] when the wait times out.
    /// - [`DispatchError::Band`] when the band fails mid-exchange.
    pub async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, DispatchError> {
        let session = self
            .resolve(&request.head.host, &request.head.path)
            .ok_or_else(|| DispatchError::NoRoute {
                host: request.head.host.clone(),
                path: request.head.path.clone(),
            })?;
        let entry = self
            .hive
            .sessions
            .get(&session)
            .ok_or(DispatchError::SessionGone(session))?;

        let band = match entry.bands().try_checkout() {
            Checkout::Ready(band) => band,
            waiting => {
                // A contended pool already has a waiter whose NeedBand is in
                // flight; bands return to the pool after each exchange.
                if matches!(waiting, Checkout::Empty) {
                    tracing::debug!(%session, "no idle band, requesting one");
                    if !entry.request_bands(1).await {
                        return Err(DispatchError::SessionGone(session));
                    }
                }
                tokio::select! {
                    biased;

                    () = entry.token().cancelled() => {
                        return Err(DispatchError::SessionGone(session));
                    }
                    band = timeout(self.band_wait, entry.bands().checkout()) => band
                        .ok()
                        .flatten()
                        .ok_or(DispatchError::NoBandAvailable(session))?,
                }
            }
        };

        tracing::debug!(%session, band = band.id(), path = %request.head.path, "dispatching");
        band.exchange(request).await.map_err(DispatchError::Band)
    }

    /// Session owning the mount that covers `host` and `path`.
    #[must_use]
    pub fn resolve(&self, host: &str, path: &str) -> Option<SessionId> {
        self.hive.mounts.resolve(host, path)
    }

    /// Identifiers of all connected sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionId> { self.hive.sessions.ids() }

    /// Number of registered mounts.
    #[must_use]
    pub fn mount_count(&self) -> usize { self.hive.mounts.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HttpReqHead;

    #[test]
    fn builder_values_are_normalized() {
        let queen = Queen::builder()
            .max_frame_length(1)
            .band_wait(Duration::ZERO)
            .build();
        assert_eq!(queen.config().max_frame_length, crate::codec::MIN_FRAME_LENGTH);
        assert_eq!(queen.config().band_wait, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn unrouted_request_is_rejected() {
        let handle = Queen::default().handle();
        let request = HttpRequest::new(HttpReqHead::new("GET", "nowhere", "/"), "");
        assert!(matches!(
            handle.dispatch(request).await,
            Err(DispatchError::NoRoute { host, .. }) if host == "nowhere"
        ));
    }

    #[tokio::test]
    async fn mount_without_session_is_gone() {
        let queen = Queen::default();
        let orphan = SessionId::generate();
        queen
            .hive
            .mounts
            .register(crate::message::MountPoint::new("h", "/"), orphan)
            .expect("free mount");
        let request = HttpRequest::new(HttpReqHead::new("GET", "h", "/"), "");
        assert!(matches!(
            queen.handle().dispatch(request).await,
            Err(DispatchError::SessionGone(id)) if id == orphan
        ));
    }
}
