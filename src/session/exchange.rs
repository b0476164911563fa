//! Per-band HTTP exchange state machine and body reassembly.

use bytes::{Bytes, BytesMut};

use super::Effect;
use crate::{
    error::ProtocolViolation,
    http::{HttpRequest, HttpResponse},
    kind::FrameKind,
    message::{HttpReqHead, HttpResHead, Message},
    role::ConnectionRole,
};

/// Position of a band within its current exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExchangeState {
    /// No exchange open; the band may carry a new request.
    #[default]
    Idle,
    /// Request head seen, no body chunk yet.
    ReqHeadReceived,
    /// At least one request body chunk seen.
    ReqBodyOpen,
    /// Request fully delivered; awaiting the response head.
    ReqComplete,
    /// Response head seen, no body chunk yet.
    ResHeadSent,
    /// At least one response body chunk seen.
    ResBodyOpen,
}

impl ExchangeState {
    /// Name used in violation reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::ReqHeadReceived => "ReqHeadReceived",
            Self::ReqBodyOpen => "ReqBodyOpen",
            Self::ReqComplete => "ReqComplete",
            Self::ResHeadSent => "ResHeadSent",
            Self::ResBodyOpen => "ResBodyOpen",
        }
    }

    /// Compute the successor state for `kind`, if the transition is legal.
    #[must_use]
    pub const fn next(self, kind: FrameKind) -> Option<Self> {
        use ExchangeState as S;
        use FrameKind as K;

        Some(match (self, kind) {
            (S::Idle, K::HttpReqHead) => S::ReqHeadReceived,
            (S::ReqHeadReceived | S::ReqBodyOpen, K::HttpReqBody) => S::ReqBodyOpen,
            (S::ReqHeadReceived | S::ReqBodyOpen, K::HttpReqEnd) => S::ReqComplete,
            (S::ReqComplete, K::HttpResHead) => S::ResHeadSent,
            (S::ResHeadSent | S::ResBodyOpen, K::HttpResBody) => S::ResBodyOpen,
            (S::ResHeadSent | S::ResBodyOpen, K::HttpResEnd) => S::Idle,
            _ => return None,
        })
    }
}

/// Transition table for one band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeMachine {
    state: ExchangeState,
}

impl ExchangeMachine {
    /// A machine for a fresh, idle band.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ExchangeState { self.state }

    /// Whether the band may start a new exchange.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.state == ExchangeState::Idle }

    /// Apply a frame travelling over the band.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::IllegalForRole`] for non-HTTP kinds and
    /// [`ProtocolViolation::UnexpectedFrame`] for out-of-order frames. The
    /// machine is left unchanged.
    pub fn on_frame(&mut self, message: &Message) -> Result<Vec<Effect>, ProtocolViolation> {
        let kind = message.kind();
        ConnectionRole::Band.check(kind)?;
        let next = self
            .state
            .next(kind)
            .ok_or(ProtocolViolation::UnexpectedFrame {
                kind,
                state: self.state.name(),
            })?;
        let effect = match message {
            Message::HttpReqHead(head) => Effect::BeginRequest(head.clone()),
            Message::HttpReqBody(chunk) => Effect::RequestChunk(chunk.clone()),
            Message::HttpReqEnd => Effect::RequestComplete,
            Message::HttpResHead(head) => Effect::BeginResponse(head.clone()),
            Message::HttpResBody(chunk) => Effect::ResponseChunk(chunk.clone()),
            _ => Effect::ExchangeComplete,
        };
        self.state = next;
        Ok(vec![effect])
    }
}

/// Milestone reached while tracking an exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// The request head, body and end marker have all been seen.
    RequestComplete(HttpRequest),
    /// The response is complete; the band is idle again.
    ResponseComplete(HttpResponse),
}

/// Reassembles the request and response carried by a band.
///
/// Body chunks are concatenated strictly in arrival order.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use hivewire::{
///     message::{HttpReqHead, HttpResHead, Message},
///     session::{ExchangeEvent, ExchangeTracker},
/// };
///
/// let mut band = ExchangeTracker::new();
/// band.observe(&HttpReqHead::new("GET", "example.com", "/").into()).expect("head");
/// let Some(ExchangeEvent::RequestComplete(request)) =
///     band.observe(&Message::HttpReqEnd).expect("end")
/// else {
///     panic!("request should be complete");
/// };
/// assert!(request.body.is_empty());
///
/// band.observe(&HttpResHead::new(204).into()).expect("response head");
/// assert!(band.observe(&Message::HttpResBody(Bytes::new())).expect("chunk").is_none());
/// assert!(matches!(
///     band.observe(&Message::HttpResEnd).expect("end"),
///     Some(ExchangeEvent::ResponseComplete(_))
/// ));
/// assert!(band.is_idle());
/// ```
#[derive(Debug, Default)]
pub struct ExchangeTracker {
    machine: ExchangeMachine,
    request_head: Option<HttpReqHead>,
    request_body: BytesMut,
    response_head: Option<HttpResHead>,
    response_body: BytesMut,
}

impl ExchangeTracker {
    /// A tracker for a fresh, idle band.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Current exchange state.
    #[must_use]
    pub fn state(&self) -> ExchangeState { self.machine.state() }

    /// Whether the band may start a new exchange.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.machine.is_idle() }

    /// Apply a frame, returning a milestone when one is reached.
    ///
    /// # Errors
    ///
    /// See [`ExchangeMachine::on_frame`].
    pub fn observe(
        &mut self,
        message: &Message,
    ) -> Result<Option<ExchangeEvent>, ProtocolViolation> {
        let mut event = None;
        for effect in self.machine.on_frame(message)? {
            match effect {
                Effect::BeginRequest(head) => {
                    self.request_head = Some(*head);
                    self.request_body.clear();
                }
                Effect::RequestChunk(chunk) => self.request_body.extend_from_slice(&chunk),
                Effect::RequestComplete => {
                    event = Some(ExchangeEvent::RequestComplete(HttpRequest {
                        head: self.request_head.take().unwrap_or_default(),
                        body: take_body(&mut self.request_body),
                    }));
                }
                Effect::BeginResponse(head) => {
                    self.response_head = Some(head);
                    self.response_body.clear();
                }
                Effect::ResponseChunk(chunk) => self.response_body.extend_from_slice(&chunk),
                Effect::ExchangeComplete => {
                    event = Some(ExchangeEvent::ResponseComplete(HttpResponse {
                        head: self.response_head.take().unwrap_or_default(),
                        body: take_body(&mut self.response_body),
                    }));
                }
                _ => {}
            }
        }
        Ok(event)
    }
}

fn take_body(buf: &mut BytesMut) -> Bytes { buf.split().freeze() }

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn head() -> Message { HttpReqHead::new("POST", "example.com", "/upload").into() }

    fn chunk(data: &'static [u8]) -> Message { Message::HttpReqBody(Bytes::from_static(data)) }

    #[test]
    fn full_exchange_reassembles_bodies_in_order() {
        let mut band = ExchangeTracker::new();
        assert_eq!(band.observe(&head()), Ok(None));
        assert_eq!(band.observe(&chunk(b"a")), Ok(None));
        assert_eq!(band.observe(&chunk(b"b")), Ok(None));
        let Ok(Some(ExchangeEvent::RequestComplete(request))) = band.observe(&Message::HttpReqEnd)
        else {
            panic!("request should complete at HTTPReqEnd");
        };
        assert_eq!(&request.body[..], b"ab");
        assert_eq!(request.head.path, "/upload");
        assert_eq!(band.state(), ExchangeState::ReqComplete);

        assert_eq!(band.observe(&HttpResHead::new(200).into()), Ok(None));
        assert_eq!(
            band.observe(&Message::HttpResBody(Bytes::from_static(b"ok"))),
            Ok(None)
        );
        let Ok(Some(ExchangeEvent::ResponseComplete(response))) =
            band.observe(&Message::HttpResEnd)
        else {
            panic!("response should complete at HTTPResEnd");
        };
        assert_eq!(response.head.status_code, 200);
        assert_eq!(&response.body[..], b"ok");
        assert!(band.is_idle());
    }

    #[test]
    fn band_is_reusable_after_exchange() {
        let mut band = ExchangeTracker::new();
        for _ in 0..2 {
            band.observe(&head()).expect("head");
            band.observe(&Message::HttpReqEnd).expect("end");
            band.observe(&HttpResHead::new(204).into()).expect("res head");
            band.observe(&Message::HttpResEnd).expect("res end");
            assert!(band.is_idle());
        }
    }

    #[test]
    fn response_body_before_head_is_rejected() {
        let mut band = ExchangeTracker::new();
        assert_eq!(
            band.observe(&Message::HttpResBody(Bytes::from_static(b"x"))),
            Err(ProtocolViolation::UnexpectedFrame {
                kind: FrameKind::HttpResBody,
                state: "Idle",
            })
        );
    }

    #[rstest]
    #[case::body_after_end(chunk(b"late"))]
    #[case::second_end(Message::HttpReqEnd)]
    #[case::second_head(head())]
    fn request_frames_after_end_are_rejected(#[case] late: Message) {
        let mut band = ExchangeTracker::new();
        band.observe(&head()).expect("head");
        band.observe(&Message::HttpReqEnd).expect("end");
        assert_eq!(
            band.observe(&late),
            Err(ProtocolViolation::UnexpectedFrame {
                kind: late.kind(),
                state: "ReqComplete",
            })
        );
    }

    #[test]
    fn response_head_before_request_end_is_rejected() {
        let mut band = ExchangeTracker::new();
        band.observe(&head()).expect("head");
        assert!(band.observe(&HttpResHead::new(200).into()).is_err());
        assert_eq!(band.state(), ExchangeState::ReqHeadReceived);
    }

    #[test]
    fn second_response_head_is_rejected() {
        let mut band = ExchangeTracker::new();
        band.observe(&head()).expect("head");
        band.observe(&Message::HttpReqEnd).expect("end");
        band.observe(&HttpResHead::new(200).into()).expect("res head");
        assert!(band.observe(&HttpResHead::new(500).into()).is_err());
    }

    #[test]
    fn mount_is_illegal_on_a_band() {
        let mut machine = ExchangeMachine::new();
        assert_eq!(
            machine.on_frame(&Message::Mount(crate::message::MountPoint::default())),
            Err(ProtocolViolation::IllegalForRole {
                kind: FrameKind::Mount,
                role: ConnectionRole::Band,
            })
        );
    }

    #[rstest]
    #[case(ExchangeState::Idle, FrameKind::HttpReqHead, Some(ExchangeState::ReqHeadReceived))]
    #[case(ExchangeState::ReqHeadReceived, FrameKind::HttpReqEnd, Some(ExchangeState::ReqComplete))]
    #[case(ExchangeState::ResBodyOpen, FrameKind::HttpResEnd, Some(ExchangeState::Idle))]
    #[case(ExchangeState::Idle, FrameKind::HttpReqEnd, None)]
    #[case(ExchangeState::ResHeadSent, FrameKind::HttpResHead, None)]
    fn transition_table(
        #[case] from: ExchangeState,
        #[case] kind: FrameKind,
        #[case] to: Option<ExchangeState>,
    ) {
        assert_eq!(from.next(kind), to);
    }
}
