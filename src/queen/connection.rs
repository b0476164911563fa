//! Per-connection tasks: handshake, cell control loop, band exchange loop.

use std::{io, net::SocketAddr, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use log::{error, warn};
use tokio::{net::TcpStream, select, sync::mpsc, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

use super::{Hive, QueenConfig};
use crate::{
    error::{HiveError, ProtocolViolation},
    http::{DEFAULT_CHUNK_SIZE, HttpRequest, HttpResponse},
    link::Link,
    message::{Accept, Message},
    metrics,
    registry::{BandHandle, ExchangeJob, MountError, SessionEntry},
    role::{ConnectionRole, Peer},
    session::{
        Effect,
        ExchangeEvent,
        ExchangeTracker,
        Hello,
        SessionId,
        SessionMachine,
        accept_hello,
    },
};

/// Outbound control frames queued per session before senders wait.
const CONTROL_CAPACITY: usize = 16;

/// Spawn a task to process a single TCP connection, logging and discarding any panics.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    hive: Arc<Hive>,
    config: QueenConfig,
    token: CancellationToken,
    tracker: &TaskTracker,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Failed to retrieve peer address: error={e}");
            None
        }
    };
    tracker.spawn(async move {
        let fut =
            AssertUnwindSafe(process_stream(stream, peer_addr, hive, config, token)).catch_unwind();
        if let Err(panic) = fut.await {
            let panic_msg = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&'static str>().copied())
                .unwrap_or("<non-string panic>");
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
            tracing::error!(panic = %panic_msg, ?peer_addr, "connection task panicked");
        }
    });
}

async fn process_stream(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    hive: Arc<Hive>,
    config: QueenConfig,
    token: CancellationToken,
) {
    let mut link = Link::new(stream, config.max_frame_length, Peer::Queen);
    let first = select! {
        biased;

        () = token.cancelled() => return,
        first = timeout(config.handshake_timeout, link.recv()) => first,
    };
    let result = match first {
        Err(_) => {
            tracing::debug!(?peer_addr, "handshake timed out");
            return;
        }
        Ok(None) => return,
        Ok(Some(Err(e))) => Err(e),
        Ok(Some(Ok(message))) => match accept_hello(&message) {
            Err(violation) => Err(violation.into()),
            Ok(Hello {
                role: ConnectionRole::Cell,
                ..
            }) => {
                CellConnection::new(hive, token)
                    .serve(link, &message, peer_addr)
                    .await
            }
            Ok(Hello {
                role: ConnectionRole::Band,
                uuid,
            }) => serve_band(link, &uuid, &hive, peer_addr).await,
        },
    };
    if let Err(e) = result {
        report_failure(&e, peer_addr);
    }
}

/// Log why a connection ended and count protocol faults.
fn report_failure(e: &HiveError, peer_addr: Option<SocketAddr>) {
    if e.is_disconnect() {
        tracing::debug!(?peer_addr, error = %e, "peer disconnected");
    } else if matches!(e, HiveError::Io(_)) {
        warn!("connection error: error={e}, peer_addr={peer_addr:?}");
    } else {
        metrics::inc_violations();
        tracing::warn!(error = %e, ?peer_addr, "closing connection after protocol error");
    }
}

/// Queen side of one cell control connection.
struct CellConnection {
    id: SessionId,
    hive: Arc<Hive>,
    token: CancellationToken,
    machine: SessionMachine,
}

impl CellConnection {
    fn new(hive: Arc<Hive>, token: CancellationToken) -> Self {
        Self {
            id: SessionId::generate(),
            hive,
            token,
            machine: SessionMachine::new(),
        }
    }

    async fn serve(
        mut self,
        mut link: Link<TcpStream>,
        hello: &Message,
        peer_addr: Option<SocketAddr>,
    ) -> Result<(), HiveError> {
        self.machine.on_frame(hello)?;
        let (control_tx, mut control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let entry = Arc::new(SessionEntry::new(self.id, control_tx, self.token.clone()));
        self.hive.sessions.insert(entry);
        metrics::inc_sessions();

        let span = tracing::info_span!("cell", session = %self.id, ?peer_addr);
        let result = async {
            let accept = Message::Accept(Accept {
                uuid: self.id.to_string(),
            });
            self.machine.on_frame(&accept)?;
            link.send(accept).await?;
            tracing::info!("session accepted");
            self.run(&mut link, &mut control_rx).await
        }
        .instrument(span.clone())
        .await;

        self.close();
        span.in_scope(|| tracing::info!("session closed"));
        metrics::dec_sessions();
        result
    }

    async fn run(
        &mut self,
        link: &mut Link<TcpStream>,
        control_rx: &mut mpsc::Receiver<Message>,
    ) -> Result<(), HiveError> {
        loop {
            select! {
                biased;

                () = self.token.cancelled() => return Ok(()),
                outbound = control_rx.recv() => {
                    let Some(message) = outbound else { return Ok(()) };
                    let effects = self.machine.on_frame(&message)?;
                    self.apply(effects);
                    link.send(message).await?;
                }
                inbound = link.recv() => {
                    let Some(message) = inbound else { return Ok(()) };
                    let message = message?;
                    tracing::debug!(kind = %message.kind(), "control frame");
                    let effects = self.machine.on_frame(&message)?;
                    self.apply(effects);
                }
            }
        }
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RegisterMount(mount) => {
                    match self.hive.mounts.register(mount.clone(), self.id) {
                        Ok(()) => {
                            metrics::inc_mounts();
                            tracing::info!(%mount, "mounted");
                        }
                        // The session keeps the claim so a later Unmount stays legal;
                        // it is never routed while another session owns the mount.
                        Err(MountError::AlreadyOwned { owner, .. }) => {
                            tracing::warn!(%mount, %owner, "mount rejected");
                        }
                        Err(e) => tracing::warn!(error = %e, "mount rejected"),
                    }
                }
                Effect::ReleaseMount(mount) => {
                    if self.hive.mounts.release(&mount, self.id).is_ok() {
                        tracing::info!(%mount, "unmounted");
                    }
                }
                Effect::CloseBands => self.token.cancel(),
                Effect::OpenBands(count) => tracing::debug!(count, "requested bands"),
                _ => {}
            }
        }
    }

    fn close(&mut self) {
        self.token.cancel();
        self.hive.sessions.remove(&self.id);
        let effects = self.machine.close();
        self.apply(effects);
        self.hive.mounts.release_all(self.id);
    }
}

/// Attach a band to its session and serve exchanges until either closes.
async fn serve_band(
    link: Link<TcpStream>,
    uuid: &str,
    hive: &Hive,
    peer_addr: Option<SocketAddr>,
) -> Result<(), HiveError> {
    let entry = uuid
        .parse::<SessionId>()
        .ok()
        .and_then(|id| hive.sessions.get(&id))
        .ok_or_else(|| ProtocolViolation::UnknownSession {
            uuid: uuid.to_owned(),
        })?;
    let band_id = entry.bands().next_id();
    let span = tracing::info_span!("band", session = %entry.id(), band = band_id, ?peer_addr);
    metrics::inc_bands();
    let result = BandConnection {
        link,
        tracker: ExchangeTracker::new(),
        entry,
        band_id,
        peer_addr,
    }
    .run()
    .instrument(span)
    .await;
    metrics::dec_bands();
    result
}

struct BandConnection {
    link: Link<TcpStream>,
    tracker: ExchangeTracker,
    entry: Arc<SessionEntry>,
    band_id: u64,
    peer_addr: Option<SocketAddr>,
}

impl BandConnection {
    async fn run(mut self) -> Result<(), HiveError> {
        let (jobs_tx, mut jobs_rx) = mpsc::channel(1);
        let handle = BandHandle::new(self.band_id, jobs_tx);
        self.entry.bands().check_in(handle.clone());
        tracing::debug!("band joined");

        let token = self.entry.token().clone();
        loop {
            select! {
                biased;

                () = token.cancelled() => return Ok(()),
                job = jobs_rx.recv() => {
                    let Some(ExchangeJob { request, reply }) = job else { return Ok(()) };
                    match self.exchange(&request, &token).await {
                        Ok(response) => {
                            let _ = reply.send(Ok(response));
                            self.entry.bands().check_in(handle.clone());
                        }
                        Err(e) => {
                            report_failure(&e, self.peer_addr);
                            let _ = reply.send(Err(e));
                            return Ok(());
                        }
                    }
                }
                inbound = self.link.recv() => {
                    // An idle band carries nothing from the cell; any frame is out of order.
                    let Some(message) = inbound else { return Ok(()) };
                    self.tracker.observe(&message?)?;
                }
            }
        }
    }

    async fn exchange(
        &mut self,
        request: &HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, HiveError> {
        select! {
            biased;

            () = token.cancelled() => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "session closed during exchange",
            )
            .into()),
            response = self.round_trip(request) => response,
        }
    }

    async fn round_trip(&mut self, request: &HttpRequest) -> Result<HttpResponse, HiveError> {
        for message in request.to_messages(DEFAULT_CHUNK_SIZE) {
            self.tracker.observe(&message)?;
            self.link.send(message).await?;
        }
        loop {
            let message = self.link.recv().await.ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "band closed mid-exchange")
            })??;
            let event = self.tracker.observe(&message)?;
            if let Some(ExchangeEvent::ResponseComplete(response)) = event {
                tracing::debug!(status = response.head.status_code, "exchange complete");
                return Ok(response);
            }
        }
    }
}
