//! Items produced by the request decoder.

use bytes::Bytes;

use crate::protocol::request::RequestHead;

/// One decoded item from the request stream.
///
/// A request is delivered as exactly one `Head` followed by zero or more
/// `Body(Data)` frames and exactly one `Body(End)` frame, even when the
/// request carries no entity.
#[derive(Debug)]
pub enum ParseEvent {
    /// The request line and headers are complete; the body (if any) follows.
    Head(RequestHead, BodyKind),
    /// A step of the request body.
    Body(BodyFrame),
}

/// One step of an entity body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyFrame {
    /// A run of body bytes, decoded from whichever framing the request uses.
    Data(Bytes),
    /// The body is complete. For chunked bodies this fires only after the
    /// trailer section's final blank line.
    End,
}

/// Entity framing declared by the request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// No entity follows the headers.
    None,
    /// A counted body of exactly `length` bytes.
    Identity { length: u64 },
    /// A chunked body; its total size is unknown up front.
    Chunked,
}

impl BodyKind {
    pub fn is_none(&self) -> bool {
        matches!(self, BodyKind::None)
    }
}

impl ParseEvent {
    #[cfg(test)]
    pub(crate) fn expect_head(self) -> (RequestHead, BodyKind) {
        match self {
            ParseEvent::Head(head, kind) => (head, kind),
            other => panic!("expected head event, got {other:?}"),
        }
    }

    #[cfg(test)]
    pub(crate) fn expect_frame(self) -> BodyFrame {
        match self {
            ParseEvent::Body(frame) => frame,
            other => panic!("expected body frame, got {other:?}"),
        }
    }
}
