//! Connection lifecycle: reading requests, dispatching handlers and writing
//! responses.

mod conn;
pub(crate) mod response;
pub(crate) mod writer;

use tokio::io::AsyncWrite;

/// Boxed write half of a connection's transport. The [`ResponseWriter`]
/// carries it across tasks and hands it back when the response finishes.
pub(crate) type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub use conn::{Connection, ConnectionConfig};
pub use response::ResponseWriter;
