//! Shared helpers for queen and cell integration tests.
#![allow(dead_code, reason = "each test crate uses a different subset")]

use std::{net::SocketAddr, time::Duration};

use futures::{SinkExt, StreamExt};
use hivewire::{
    codec::{MessageStream, framed},
    http::{HttpRequest, HttpResponse},
    message::{HttpReqHead, IAm, Message},
    queen::{Queen, QueenBuilder, QueenError, QueenHandle},
    session::SessionId,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
    time::{sleep, timeout},
};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// A queen serving on an ephemeral loopback port.
pub struct TestQueen {
    pub addr: SocketAddr,
    pub handle: QueenHandle,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), QueenError>>,
}

impl TestQueen {
    pub async fn start() -> Self { Self::start_with(Queen::builder()).await }

    pub async fn start_with(builder: QueenBuilder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("listener.local_addr");
        let queen = builder.build();
        let handle = queen.handle();
        let (shutdown, rx) = oneshot::channel();
        let task = tokio::spawn(queen.run_with_shutdown(listener, async {
            let _ = rx.await;
        }));
        Self {
            addr,
            handle,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        timeout(WAIT, self.task)
            .await
            .expect("queen stops in time")
            .expect("join queen task")
            .expect("queen run");
    }
}

/// Poll `check` until it holds, panicking after [`WAIT`].
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let result = timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

pub fn get(host: &str, path: &str) -> HttpRequest {
    HttpRequest::new(HttpReqHead::new("GET", host, path), "")
}

pub fn post(host: &str, path: &str, body: impl Into<bytes::Bytes>) -> HttpRequest {
    HttpRequest::new(HttpReqHead::new("POST", host, path), body)
}

/// Response echoing the method, path and body of `request`.
pub async fn echo(request: HttpRequest) -> HttpResponse {
    let mut body = format!("{} {} ", request.head.method, request.head.path).into_bytes();
    body.extend_from_slice(&request.body);
    HttpResponse::new(200, body)
}

/// A hand-driven connection for exercising the queen frame by frame.
pub struct RawPeer {
    pub stream: MessageStream<TcpStream>,
}

impl RawPeer {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            stream: framed(stream, 1024 * 1024),
        }
    }

    /// Open a control connection and complete the handshake.
    pub async fn cell(addr: SocketAddr) -> (Self, SessionId) {
        let mut peer = Self::connect(addr).await;
        peer.send(IAm::cell().into()).await;
        let Message::Accept(accept) = peer.recv().await else {
            panic!("queen should answer IAm with Accept");
        };
        let id = accept.uuid.parse().expect("session id is a uuid");
        (peer, id)
    }

    /// Open a band for `session`.
    pub async fn band(addr: SocketAddr, session: &SessionId) -> Self {
        let mut peer = Self::connect(addr).await;
        peer.send(IAm::band(session).into()).await;
        peer
    }

    pub async fn send(&mut self, message: Message) {
        self.stream.send(message).await.expect("send frame");
    }

    pub async fn recv(&mut self) -> Message {
        timeout(WAIT, self.stream.next())
            .await
            .expect("frame in time")
            .expect("connection open")
            .expect("frame decodes")
    }

    /// Assert the queen hangs up without sending anything further.
    pub async fn expect_closed(mut self) {
        let next = timeout(WAIT, self.stream.next())
            .await
            .expect("queen closes in time");
        assert!(
            matches!(next, None | Some(Err(_))),
            "expected the queen to close the connection, got {next:?}"
        );
    }
}
