//! Pull-style access to a request body.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::protocol::error::BodyError;

/// How many body frames may sit between the connection and a slow handler
/// before reads pause. This is the backpressure bound: the connection stops
/// pulling from the transport when the channel is full.
const BODY_CHANNEL_SIZE: usize = 8;

/// Creates a connected producer/consumer pair for one request body.
pub(crate) fn body_channel() -> (BodySender, BodyBuffer) {
    let (tx, rx) = mpsc::channel(BODY_CHANNEL_SIZE);
    (BodySender { tx }, BodyBuffer { rx, done: false })
}

/// A request body with no entity. `data()` reports end-of-body immediately.
pub(crate) fn empty_body() -> BodyBuffer {
    let (_tx, rx) = mpsc::channel(1);
    BodyBuffer { rx, done: false }
}

/// Producer half held by the connection's body pump.
///
/// Dropping the sender marks end-of-body; send an error first to signal an
/// abnormal end instead.
pub(crate) struct BodySender {
    tx: mpsc::Sender<Result<Bytes, BodyError>>,
}

impl BodySender {
    /// Forwards a run of body bytes. Returns `false` if the handler has
    /// dropped its [`BodyBuffer`], in which case remaining frames can be
    /// discarded.
    pub(crate) async fn data(&self, data: Bytes) -> bool {
        self.tx.send(Ok(data)).await.is_ok()
    }

    /// Signals an abnormal end of body.
    pub(crate) async fn fail(self, error: BodyError) {
        let _ = self.tx.send(Err(error)).await;
    }
}

/// Consumer half handed to the handler inside [`Request`].
///
/// Body data arrives incrementally as the connection reads it from the
/// transport; chunked framing is already removed.
///
/// [`Request`]: crate::protocol::request::Request
#[derive(Debug)]
pub struct BodyBuffer {
    rx: mpsc::Receiver<Result<Bytes, BodyError>>,
    done: bool,
}

impl BodyBuffer {
    /// Pulls the next run of body bytes.
    ///
    /// Returns `None` once the body is complete. After an error or the end
    /// of the body, every further call returns `None`.
    pub async fn data(&mut self) -> Option<Result<Bytes, BodyError>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Ok(data)) => Some(Ok(data)),
            Some(Err(error)) => {
                self.done = true;
                Some(Err(error))
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    /// Collects the remainder of the body into one buffer.
    pub async fn bytes(&mut self) -> Result<Bytes, BodyError> {
        let mut buf = BytesMut::new();
        while let Some(data) = self.data().await {
            buf.extend_from_slice(&data?);
        }
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn data_then_end() {
        let (tx, mut body) = body_channel();
        tokio::spawn(async move {
            assert!(tx.data(Bytes::from_static(b"hello ")).await);
            assert!(tx.data(Bytes::from_static(b"world")).await);
        });
        assert_eq!(body.bytes().await.unwrap(), Bytes::from_static(b"hello world"));
        assert!(body.data().await.is_none());
    }

    #[tokio::test]
    async fn empty_body_ends_immediately() {
        let mut body = empty_body();
        assert!(body.data().await.is_none());
        assert!(body.data().await.is_none());
    }

    #[tokio::test]
    async fn error_is_terminal() {
        let (tx, mut body) = body_channel();
        tokio::spawn(async move {
            tx.fail(BodyError::Aborted).await;
        });
        assert_eq!(body.data().await, Some(Err(BodyError::Aborted)));
        assert!(body.data().await.is_none());
    }
}
