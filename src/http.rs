//! Whole HTTP requests and responses carried over a band.
//!
//! A band transmits each as a head frame, zero or more body chunks, and an
//! end marker. These types hold the reassembled form.

use std::num::NonZeroUsize;

use bytes::Bytes;

use crate::message::{HttpReqHead, HttpResHead, Message};

/// Default size of the body chunks a message is split into (16 KiB).
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(16 * 1024) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

/// A request routed from the queen to a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request head.
    pub head: HttpReqHead,
    /// Complete request body.
    pub body: Bytes,
}

impl HttpRequest {
    /// Request with `head` and `body`.
    pub fn new(head: HttpReqHead, body: impl Into<Bytes>) -> Self {
        Self {
            head,
            body: body.into(),
        }
    }

    /// Frames carrying this request: head, body chunks, end marker.
    #[must_use]
    pub fn to_messages(&self, chunk_size: NonZeroUsize) -> Vec<Message> {
        framed(
            Message::HttpReqHead(Box::new(self.head.clone())),
            &self.body,
            chunk_size,
            Message::HttpReqBody,
            Message::HttpReqEnd,
        )
    }
}

/// A response produced by a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Response head.
    pub head: HttpResHead,
    /// Complete response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Response with `status_code` and `body` and no headers.
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            head: HttpResHead::new(status_code),
            body: body.into(),
        }
    }

    /// Frames carrying this response: head, body chunks, end marker.
    #[must_use]
    pub fn to_messages(&self, chunk_size: NonZeroUsize) -> Vec<Message> {
        framed(
            Message::HttpResHead(self.head.clone()),
            &self.body,
            chunk_size,
            Message::HttpResBody,
            Message::HttpResEnd,
        )
    }
}

fn framed(
    head: Message,
    body: &Bytes,
    chunk_size: NonZeroUsize,
    chunk: fn(Bytes) -> Message,
    end: Message,
) -> Vec<Message> {
    let size = chunk_size.get();
    let mut messages = Vec::with_capacity(body.len().div_ceil(size) + 2);
    messages.push(head);
    let mut offset = 0;
    while offset < body.len() {
        let stop = (offset + size).min(body.len());
        messages.push(chunk(body.slice(offset..stop)));
        offset = stop;
    }
    messages.push(end);
    messages
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::kind::FrameKind;

    fn size(n: usize) -> NonZeroUsize { NonZeroUsize::new(n).expect("non-zero chunk size") }

    #[test]
    fn empty_body_has_no_chunks() {
        let kinds: Vec<FrameKind> = HttpResponse::new(204, Bytes::new())
            .to_messages(size(4))
            .iter()
            .map(Message::kind)
            .collect();
        assert_eq!(kinds, [FrameKind::HttpResHead, FrameKind::HttpResEnd]);
    }

    #[rstest]
    #[case(1, 5)]
    #[case(2, 3)]
    #[case(5, 1)]
    #[case(64, 1)]
    fn body_is_split_in_order(#[case] chunk: usize, #[case] chunks: usize) {
        let request = HttpRequest::new(HttpReqHead::new("PUT", "h", "/"), "hello");
        let messages = request.to_messages(size(chunk));
        assert_eq!(messages.len(), chunks + 2);
        let body: Vec<u8> = messages
            .iter()
            .filter_map(|message| match message {
                Message::HttpReqBody(data) => Some(data.to_vec()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(body, b"hello");
        assert_eq!(messages.last(), Some(&Message::HttpReqEnd));
    }
}
