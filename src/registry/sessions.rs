//! Live sessions and the bands attached to them.
//!
//! `SessionRegistry` maps each [`SessionId`] to a [`SessionEntry`] holding
//! the channel into its cell connection, its pool of idle bands, and the
//! token that tears the whole session down.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
    error::HiveError,
    http::{HttpRequest, HttpResponse},
    message::{Message, NeedBand},
    session::SessionId,
};

/// An exchange submitted to a band task.
#[derive(Debug)]
pub struct ExchangeJob {
    /// Request to forward to the cell.
    pub request: HttpRequest,
    /// Receives the assembled response or the failure that ended the band.
    pub reply: oneshot::Sender<Result<HttpResponse, HiveError>>,
}

/// Handle on one band connection.
#[derive(Clone, Debug)]
pub struct BandHandle {
    id: u64,
    jobs: mpsc::Sender<ExchangeJob>,
}

impl BandHandle {
    /// Pair a band identifier with the channel its task reads jobs from.
    #[must_use]
    pub fn new(id: u64, jobs: mpsc::Sender<ExchangeJob>) -> Self { Self { id, jobs } }

    /// Identifier of the band within its pool.
    #[must_use]
    pub fn id(&self) -> u64 { self.id }

    /// Whether the band task has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.jobs.is_closed() }

    /// Run one request/response exchange over the band.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the band, or a broken pipe if the band
    /// task had already exited.
    pub async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, HiveError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(ExchangeJob { request, reply })
            .await
            .map_err(|_| band_gone())?;
        response.await.map_err(|_| band_gone())?
    }
}

fn band_gone() -> HiveError {
    io::Error::new(io::ErrorKind::BrokenPipe, "band closed before the exchange completed").into()
}

/// Outcome of [`BandPool::try_checkout`].
#[derive(Debug)]
pub enum Checkout {
    /// An idle band, now owned by the caller.
    Ready(BandHandle),
    /// No band is idle and nobody is waiting for one.
    Empty,
    /// Another caller is already waiting in [`BandPool::checkout`].
    Contended,
}

/// Idle bands of one session, handed out first come first served.
#[derive(Debug)]
pub struct BandPool {
    idle_tx: mpsc::UnboundedSender<BandHandle>,
    idle_rx: Mutex<mpsc::UnboundedReceiver<BandHandle>>,
    next_id: AtomicU64,
}

impl Default for BandPool {
    fn default() -> Self { Self::new() }
}

impl BandPool {
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        Self {
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an identifier for a joining band.
    pub fn next_id(&self) -> u64 { self.next_id.fetch_add(1, Ordering::Relaxed) }

    /// Return an idle band to the pool.
    pub fn check_in(&self, band: BandHandle) {
        // The receiver lives as long as the pool, so this cannot fail.
        let _ = self.idle_tx.send(band);
    }

    /// Take an idle band without waiting.
    ///
    /// A waiter in [`checkout`](Self::checkout) holds the receiver, so any
    /// band checked in meanwhile goes to it and this reports
    /// [`Checkout::Contended`].
    pub fn try_checkout(&self) -> Checkout {
        let Ok(mut idle) = self.idle_rx.try_lock() else {
            return Checkout::Contended;
        };
        while let Ok(band) = idle.try_recv() {
            if !band.is_closed() {
                return Checkout::Ready(band);
            }
        }
        Checkout::Empty
    }

    /// Wait for an idle band. Waiters are served in arrival order.
    pub async fn checkout(&self) -> Option<BandHandle> {
        let mut idle = self.idle_rx.lock().await;
        while let Some(band) = idle.recv().await {
            if !band.is_closed() {
                return Some(band);
            }
        }
        None
    }
}

/// Everything the queen holds for one connected cell.
#[derive(Debug)]
pub struct SessionEntry {
    id: SessionId,
    control: mpsc::Sender<Message>,
    bands: BandPool,
    token: CancellationToken,
}

impl SessionEntry {
    /// Build an entry whose cell connection drains `control`.
    #[must_use]
    pub fn new(id: SessionId, control: mpsc::Sender<Message>, token: CancellationToken) -> Self {
        Self {
            id,
            control,
            bands: BandPool::new(),
            token,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId { self.id }

    /// Idle bands of the session.
    #[must_use]
    pub fn bands(&self) -> &BandPool { &self.bands }

    /// Token cancelled when the session closes.
    #[must_use]
    pub fn token(&self) -> &CancellationToken { &self.token }

    /// Ask the cell to open `count` more bands.
    ///
    /// Returns `false` if the cell connection has already gone away.
    pub async fn request_bands(&self, count: u32) -> bool {
        self.control
            .send(Message::NeedBand(NeedBand { count }))
            .await
            .is_ok()
    }
}

/// Concurrent registry of live sessions keyed by [`SessionId`].
#[derive(Debug, Default)]
pub struct SessionRegistry(DashMap<SessionId, Arc<SessionEntry>>);

impl SessionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Insert an entry for a newly accepted cell.
    pub fn insert(&self, entry: Arc<SessionEntry>) { self.0.insert(entry.id(), entry); }

    /// Retrieve the entry for `id` if the session is still open.
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        let entry = self.0.get(id).map(|guard| Arc::clone(guard.value()))?;
        if entry.token().is_cancelled() {
            self.0.remove_if(id, |_, held| held.token().is_cancelled());
            return None;
        }
        Some(entry)
    }

    /// Remove an entry, typically on cell disconnect.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.0.remove(id).map(|(_, entry)| entry)
    }

    /// Identifiers of all registered sessions.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> { self.0.iter().map(|entry| *entry.key()).collect() }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    fn session_entry() -> (Arc<SessionEntry>, mpsc::Receiver<Message>) {
        let (control, rx) = mpsc::channel(4);
        let entry = SessionEntry::new(SessionId::generate(), control, CancellationToken::new());
        (Arc::new(entry), rx)
    }

    fn band(pool: &BandPool) -> (BandHandle, mpsc::Receiver<ExchangeJob>) {
        let (jobs, rx) = mpsc::channel(1);
        (BandHandle::new(pool.next_id(), jobs), rx)
    }

    #[test]
    fn empty_pool_has_nothing_to_checkout() {
        let pool = BandPool::new();
        assert!(matches!(pool.try_checkout(), Checkout::Empty));
    }

    #[test]
    fn closed_bands_are_skipped() {
        let pool = BandPool::new();
        let (dead, dead_rx) = band(&pool);
        let (live, _live_rx) = band(&pool);
        drop(dead_rx);
        pool.check_in(dead);
        pool.check_in(live.clone());
        assert!(matches!(pool.try_checkout(), Checkout::Ready(b) if b.id() == live.id()));
        assert!(matches!(pool.try_checkout(), Checkout::Empty));
    }

    #[tokio::test]
    async fn pending_waiter_makes_try_checkout_contended() {
        let pool = Arc::new(BandPool::new());
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.checkout().await.map(|b| b.id()) })
        };
        tokio::task::yield_now().await;
        assert!(matches!(pool.try_checkout(), Checkout::Contended));

        let (handle, _rx) = band(&pool);
        let id = handle.id();
        pool.check_in(handle);
        let got = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .expect("waiter task");
        assert_eq!(got, Some(id));
        assert!(matches!(pool.try_checkout(), Checkout::Empty));
    }

    #[tokio::test]
    async fn exchange_reports_a_vanished_band() {
        let pool = BandPool::new();
        let (handle, rx) = band(&pool);
        drop(rx);
        let err = handle
            .exchange(HttpRequest::default())
            .await
            .expect_err("band gone");
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn request_bands_sends_need_band() {
        let (entry, mut rx) = session_entry();
        assert!(entry.request_bands(2).await);
        assert_eq!(rx.recv().await, Some(Message::NeedBand(NeedBand { count: 2 })));
    }

    #[test]
    fn cancelled_sessions_are_pruned_on_lookup() {
        let (entry, _rx) = session_entry();
        let registry = SessionRegistry::new();
        registry.insert(Arc::clone(&entry));
        assert!(registry.get(&entry.id()).is_some());
        entry.token().cancel();
        assert!(registry.get(&entry.id()).is_none());
        assert!(registry.is_empty());
    }
}
