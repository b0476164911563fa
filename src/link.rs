//! Direction-checked message transport shared by both runtimes.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    codec::{MessageStream, framed},
    error::Result,
    message::Message,
    metrics::{self, Direction},
    role::Peer,
};

/// One end of a connection, seen from `local`.
///
/// Every inbound frame is checked against the catalog's sender column before
/// it is handed to a state machine.
#[derive(Debug)]
pub(crate) struct Link<T> {
    framed: MessageStream<T>,
    local: Peer,
}

impl<T> Link<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: T, max_frame_length: usize, local: Peer) -> Self {
        Self {
            framed: framed(io, max_frame_length),
            local,
        }
    }

    /// Write one message and flush it.
    pub(crate) async fn send(&mut self, message: Message) -> Result<()> {
        let kind = message.kind();
        self.framed.send(message).await?;
        metrics::inc_frames(Direction::Outbound, kind);
        Ok(())
    }

    /// Read the next message; `None` on a clean close.
    ///
    /// Cancel safe: the only await point is the underlying stream poll.
    pub(crate) async fn recv(&mut self) -> Option<Result<Message>> {
        let message = match self.framed.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(e)),
        };
        metrics::inc_frames(Direction::Inbound, message.kind());
        if let Err(violation) = self.local.check_inbound(message.kind()) {
            return Some(Err(violation.into()));
        }
        Some(Ok(message))
    }
}
