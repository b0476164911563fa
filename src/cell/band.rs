//! Cell side of a band: receive requests, answer them through the handler.

use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc};

use tokio::{net::TcpStream, select};
use tokio_util::sync::CancellationToken;

use super::{CellError, RequestHandler};
use crate::{
    error::HiveError,
    link::Link,
    message::IAm,
    role::Peer,
    session::{ExchangeEvent, ExchangeTracker, SessionId},
};

/// Settings every band of a session shares.
#[derive(Clone)]
pub(super) struct BandContext {
    pub(super) addr: SocketAddr,
    pub(super) session: SessionId,
    pub(super) handler: Arc<dyn RequestHandler>,
    pub(super) chunk_size: NonZeroUsize,
    pub(super) max_frame_length: usize,
    pub(super) token: CancellationToken,
}

/// Open one band and serve exchanges on it until the queen or the session
/// closes it.
pub(super) async fn run_band(ctx: BandContext) -> Result<(), CellError> {
    let stream = TcpStream::connect(ctx.addr)
        .await
        .map_err(CellError::Connect)?;
    let mut link = Link::new(stream, ctx.max_frame_length, Peer::Cell);
    link.send(IAm::band(&ctx.session).into()).await?;
    tracing::debug!("band open");
    serve(&mut link, &ctx).await.map_err(CellError::from)
}

async fn serve(link: &mut Link<TcpStream>, ctx: &BandContext) -> Result<(), HiveError> {
    let mut tracker = ExchangeTracker::new();
    loop {
        let message = select! {
            biased;

            () = ctx.token.cancelled() => return Ok(()),
            inbound = link.recv() => match inbound {
                Some(message) => message?,
                None => return Ok(()),
            },
        };
        let Some(ExchangeEvent::RequestComplete(request)) = tracker.observe(&message)? else {
            continue;
        };
        tracing::debug!(
            method = %request.head.method,
            path = %request.head.path,
            "handling request"
        );
        let response = ctx.handler.handle(request).await;
        for message in response.to_messages(ctx.chunk_size) {
            tracker.observe(&message)?;
            link.send(message).await?;
        }
    }
}
