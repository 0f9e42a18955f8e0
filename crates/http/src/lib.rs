//! An embeddable HTTP/1.x server library.
//!
//! The crate is a set of small, separately usable layers:
//!
//! - [`codec`]: an incremental request parser that accepts arbitrarily split
//!   input and removes body framing, plus the response body encoders.
//! - [`connection`]: drives one transport connection through sequential
//!   request/response exchanges, with keep-alive, idle timeouts and
//!   synthesized error responses.
//! - [`handler`] and [`scheduler`]: application handlers run on a fixed
//!   worker pool, never on connection tasks; a panicking handler costs its
//!   connection, not the server.
//! - [`server`]: a TCP accept loop tying the layers together.
//!
//! Responses are streamed through a [`ResponseWriter`] rather than built as
//! values, so a handler can start sending before it knows the full body.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lean_http::handler::{make_handler, Handler, Router};
//! use lean_http::protocol::RequestHead;
//! use lean_http::{Server, ServerConfig, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let hello: Arc<dyn Handler> = Arc::new(make_handler(|_request, mut response| async move {
//!         response.start(StatusCode::OK);
//!         response.header("Content-Length", "13");
//!         response.write(b"Hello, world!").await?;
//!         response.finish().await?;
//!         Ok(())
//!     }));
//!
//!     let router: Arc<dyn Router> =
//!         Arc::new(move |head: &RequestHead| -> Option<Arc<dyn Handler>> {
//!             if head.path() == "/hello" { Some(Arc::clone(&hello)) } else { None }
//!         });
//!
//!     Server::new(ServerConfig::default(), router).run().await
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod scheduler;
pub mod server;

mod date;
mod utils;

pub use codec::{ParserConfig, RequestParser};
pub use connection::{Connection, ConnectionConfig, ResponseWriter};
pub use handler::{make_handler, Handler, HandlerError, Router};
pub use protocol::{
    BodyBuffer, BodyError, HeaderMap, HttpError, Method, ProtocolError, Request, RequestHead,
    Version,
};
pub use scheduler::Scheduler;
pub use server::{Server, ServerConfig};

pub use http::StatusCode;
