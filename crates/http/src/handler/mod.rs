//! Request handler and routing seams.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::ResponseWriter;
use crate::protocol::{Request, RequestHead};

/// Error a handler may surface instead of finishing its response.
///
/// The error is logged and the connection torn down; nothing about it
/// reaches the peer.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Serves one request.
///
/// The handler owns the [`ResponseWriter`] and must complete it with
/// `finish` (or `abort`); dropping it unfinished kills the connection.
/// Handlers run on the scheduler's worker pool, never on the connection
/// task.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: Request, response: ResponseWriter) -> Result<(), HandlerError>;
}

/// Adapts an async function or closure into a [`Handler`].
pub struct HandlerFn<F> {
    f: F,
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn call(&self, request: Request, response: ResponseWriter) -> Result<(), HandlerError> {
        (self.f)(request, response).await
    }
}

/// Wraps an async function or closure as a [`Handler`].
pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    HandlerFn { f }
}

/// Resolves a request head to the handler that should serve it.
///
/// The routing strategy is the embedder's concern; the connection consumes
/// this purely as a lookup. `None` is answered with a plain 404.
pub trait Router: Send + Sync {
    fn resolve(&self, head: &RequestHead) -> Option<Arc<dyn Handler>>;
}

impl<F> Router for F
where
    F: Fn(&RequestHead) -> Option<Arc<dyn Handler>> + Send + Sync,
{
    fn resolve(&self, head: &RequestHead) -> Option<Arc<dyn Handler>> {
        self(head)
    }
}
