//! The cell: a backend process that mounts routes on a queen and serves the
//! requests routed to them.
//!
//! A cell keeps one control connection open to the queen and opens bands on
//! demand. Each band carries one exchange at a time.

mod band;
mod error;
mod handler;

use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc, time::Duration};

pub use error::CellError;
pub use handler::{HandlerFn, RequestHandler, handler_fn};
use log::warn;
use tokio::{
    net::TcpStream,
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

use self::band::{BandContext, run_band};
use crate::{
    codec::{DEFAULT_MAX_FRAME_LENGTH, clamp_frame_length},
    error::{HiveError, ProtocolViolation},
    http::DEFAULT_CHUNK_SIZE,
    link::Link,
    message::{IAm, Message, MountPoint},
    registry::MountError,
    role::Peer,
    session::{Effect, SessionId, SessionMachine},
};

/// Tunables for a cell session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellConfig {
    /// Mounts claimed right after the session is accepted.
    pub mounts: Vec<MountPoint>,
    /// Bands opened before the first request arrives.
    pub initial_bands: u32,
    /// Upper bound on concurrently open bands.
    pub max_bands: usize,
    /// Size of the body chunks responses are split into.
    pub chunk_size: NonZeroUsize,
    /// Largest frame accepted from the queen.
    pub max_frame_length: usize,
    /// How long to wait for the queen's `Accept`.
    pub accept_timeout: Duration,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            mounts: Vec::new(),
            initial_bands: 1,
            max_bands: 64,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            accept_timeout: Duration::from_secs(10),
        }
    }
}

impl CellConfig {
    /// Clamp every field to a usable value.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_frame_length = clamp_frame_length(self.max_frame_length);
        self.max_bands = self.max_bands.max(1);
        self.accept_timeout = self.accept_timeout.max(Duration::from_millis(1));
        self
    }
}

/// Entry point for connecting cells.
#[derive(Debug)]
pub struct Cell;

impl Cell {
    /// Start configuring a cell.
    #[must_use]
    pub fn builder() -> CellBuilder { CellBuilder::default() }

    /// Connect with the default configuration and no mounts.
    ///
    /// # Errors
    ///
    /// See [`CellBuilder::connect`].
    pub async fn connect<H>(addr: SocketAddr, handler: H) -> Result<CellSession, CellError>
    where
        H: RequestHandler,
    {
        Self::builder().connect(addr, handler).await
    }
}

/// Builder for a cell session.
///
/// # Examples
///
/// ```no_run
/// use hivewire::{
///     cell::{Cell, handler_fn},
///     http::{HttpRequest, HttpResponse},
/// };
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), hivewire::cell::CellError> {
/// let session = Cell::builder()
///     .mount("example.com", "/api")
///     .initial_bands(2)
///     .connect(
///         "127.0.0.1:7700".parse().expect("valid address"),
///         handler_fn(|_req: HttpRequest| async { HttpResponse::new(200, "hello") }),
///     )
///     .await?;
/// session.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct CellBuilder {
    config: CellConfig,
}

impl From<CellConfig> for CellBuilder {
    fn from(config: CellConfig) -> Self { Self { config } }
}

impl CellBuilder {
    /// Claim `path` under `host` once connected. An empty host matches any host.
    #[must_use]
    pub fn mount(mut self, host: impl Into<String>, path: impl Into<String>) -> Self {
        self.config.mounts.push(MountPoint::new(host, path));
        self
    }

    /// Number of bands opened up front.
    #[must_use]
    pub fn initial_bands(mut self, count: u32) -> Self {
        self.config.initial_bands = count;
        self
    }

    /// Upper bound on concurrently open bands.
    #[must_use]
    pub fn max_bands(mut self, count: usize) -> Self {
        self.config.max_bands = count;
        self
    }

    /// Size of response body chunks.
    #[must_use]
    pub fn chunk_size(mut self, size: NonZeroUsize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Largest frame accepted from the queen.
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.config.max_frame_length = length;
        self
    }

    /// How long to wait for the queen's `Accept`.
    #[must_use]
    pub fn accept_timeout(mut self, limit: Duration) -> Self {
        self.config.accept_timeout = limit;
        self
    }

    /// Open the control connection, register mounts, and start serving.
    ///
    /// Returns once the queen has accepted the session and every configured
    /// mount has been sent; bands connect in the background.
    ///
    /// # Errors
    ///
    /// - [`CellError::Connect`] if the queen is unreachable.
    /// - [`CellError::AcceptTimeout`] or [`CellError::NotAccepted`] if the
    ///   handshake does not complete.
    /// - [`CellError::InvalidSessionId`] if the queen's identifier is not a UUID.
    /// - [`CellError::Wire`] on any framing or protocol failure.
    pub async fn connect<H>(self, addr: SocketAddr, handler: H) -> Result<CellSession, CellError>
    where
        H: RequestHandler,
    {
        let config = self.config.normalized();
        let stream = TcpStream::connect(addr)
            .await
            .map_err(CellError::Connect)?;
        let mut link = Link::new(stream, config.max_frame_length, Peer::Cell);
        let mut machine = SessionMachine::new();

        let iam = Message::IAm(IAm::cell());
        machine.on_frame(&iam).map_err(HiveError::from)?;
        link.send(iam).await?;

        let session = await_accept(&mut link, &mut machine, config.accept_timeout).await?;
        let span = tracing::info_span!("cell", %session, %addr);
        span.in_scope(|| tracing::info!("session accepted"));

        for mount in &config.mounts {
            let message = Message::Mount(mount.clone());
            machine.on_frame(&message).map_err(HiveError::from)?;
            link.send(message).await?;
        }

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let control = Control {
            link,
            machine,
            commands: commands_rx,
            tracker: tracker.clone(),
            max_bands: config.max_bands,
            band: BandContext {
                addr,
                session,
                handler: Arc::new(handler),
                chunk_size: config.chunk_size,
                max_frame_length: config.max_frame_length,
                token: token.clone(),
            },
        };
        span.in_scope(|| control.open_bands(config.initial_bands));
        let task = tokio::spawn(control.run().instrument(span));

        Ok(CellSession {
            id: session,
            commands: commands_tx,
            token,
            tracker,
            task,
        })
    }
}

async fn await_accept(
    link: &mut Link<TcpStream>,
    machine: &mut SessionMachine,
    limit: Duration,
) -> Result<SessionId, CellError> {
    let message = match timeout(limit, link.recv()).await {
        Err(_) => return Err(CellError::AcceptTimeout),
        Ok(None) => return Err(CellError::NotAccepted),
        Ok(Some(message)) => message?,
    };
    let Message::Accept(accept) = &message else {
        return Err(HiveError::from(ProtocolViolation::UnexpectedFrame {
            kind: message.kind(),
            state: machine.state().name(),
        })
        .into());
    };
    machine.on_frame(&message).map_err(HiveError::from)?;
    accept
        .uuid
        .parse()
        .map_err(|_| CellError::InvalidSessionId {
            uuid: accept.uuid.clone(),
        })
}

enum Command {
    Unmount {
        mount: MountPoint,
        reply: oneshot::Sender<Result<(), CellError>>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmount { mount, .. } => f.debug_struct("Unmount").field("mount", mount).finish(),
        }
    }
}

/// Cell side of the control connection.
struct Control {
    link: Link<TcpStream>,
    machine: SessionMachine,
    commands: mpsc::Receiver<Command>,
    tracker: TaskTracker,
    max_bands: usize,
    band: BandContext,
}

impl Control {
    async fn run(mut self) -> Result<(), CellError> {
        let result = self.serve().await;
        self.band.token.cancel();
        self.machine.close();
        match &result {
            Ok(()) => tracing::info!("session closed"),
            Err(e) => warn!("session closed: error={e}"),
        }
        result
    }

    async fn serve(&mut self) -> Result<(), CellError> {
        loop {
            select! {
                biased;

                () = self.band.token.cancelled() => return Ok(()),
                command = self.commands.recv() => match command {
                    Some(Command::Unmount { mount, reply }) => {
                        let _ = reply.send(self.unmount(mount).await);
                    }
                    None => return Ok(()),
                },
                inbound = self.link.recv() => {
                    let Some(message) = inbound else { return Ok(()) };
                    let message = message?;
                    for effect in self.machine.on_frame(&message).map_err(HiveError::from)? {
                        if let Effect::OpenBands(count) = effect {
                            self.open_bands(count);
                        }
                    }
                }
            }
        }
    }

    async fn unmount(&mut self, mount: MountPoint) -> Result<(), CellError> {
        let message = Message::Unmount(mount.clone());
        match self.machine.on_frame(&message) {
            Ok(_) => {}
            Err(ProtocolViolation::NotMounted { .. }) => {
                return Err(MountError::NotOwned { mount }.into());
            }
            Err(violation) => return Err(HiveError::from(violation).into()),
        }
        self.link.send(message).await?;
        tracing::info!(%mount, "unmounted");
        Ok(())
    }

    fn open_bands(&self, requested: u32) {
        let room = self.max_bands.saturating_sub(self.tracker.len());
        let wanted = usize::try_from(requested).unwrap_or(usize::MAX);
        let count = wanted.min(room);
        if count < wanted {
            tracing::debug!(requested, opening = count, "band limit reached");
        }
        for _ in 0..count {
            let ctx = self.band.clone();
            self.tracker.spawn(
                async move {
                    match run_band(ctx).await {
                        Ok(()) => tracing::debug!("band closed"),
                        Err(CellError::Wire(e)) if e.is_disconnect() => {
                            tracing::debug!(error = %e, "band disconnected");
                        }
                        Err(e) => warn!("band closed: error={e}"),
                    }
                }
                .in_current_span(),
            );
        }
    }
}

/// A live cell session.
///
/// Dropping the session ends the control connection and every band.
#[derive(Debug)]
pub struct CellSession {
    id: SessionId,
    commands: mpsc::Sender<Command>,
    token: CancellationToken,
    tracker: TaskTracker,
    task: JoinHandle<Result<(), CellError>>,
}

impl CellSession {
    /// Identifier issued by the queen.
    #[must_use]
    pub fn id(&self) -> SessionId { self.id }

    /// Number of bands currently open.
    #[must_use]
    pub fn band_count(&self) -> usize { self.tracker.len() }

    /// Whether the control connection has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.token.is_cancelled() }

    /// Wait until the control connection ends.
    pub async fn closed(&self) { self.token.cancelled().await; }

    /// Give up a mount this session registered.
    ///
    /// # Errors
    ///
    /// Returns [`CellError::Mount`] if the session does not hold the mount and
    /// [`CellError::Closed`] once the session has ended.
    pub async fn unmount(&self, host: &str, path: &str) -> Result<(), CellError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::Unmount {
                mount: MountPoint::new(host, path),
                reply,
            })
            .await
            .map_err(|_| CellError::Closed)?;
        result.await.map_err(|_| CellError::Closed)?
    }

    /// Close the control connection and every band, then wait for them.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the control connection, if any.
    pub async fn shutdown(self) -> Result<(), CellError> {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!("cell control task failed: error={e}");
                Err(CellError::Closed)
            }
        }
    }
}
