//! Core protocol types: methods, versions, headers, requests, bodies and
//! the error taxonomy.

pub mod body;
pub mod error;
pub mod headers;
pub mod message;
pub mod method;
pub mod request;
pub mod version;

pub use body::BodyBuffer;
pub use error::{BodyError, HttpError, ParseError, ProtocolError, SendError};
pub use headers::HeaderMap;
pub use message::{BodyFrame, BodyKind, ParseEvent};
pub use method::Method;
pub use request::{Request, RequestHead};
pub use version::Version;
