//! Request types surfaced to handlers.

use crate::protocol::body::BodyBuffer;
use crate::protocol::headers::HeaderMap;
use crate::protocol::method::Method;
use crate::protocol::version::Version;

/// The request line and headers of a request, available before any body
/// bytes have arrived.
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    version: Version,
    target: String,
    headers: HeaderMap,
}

impl RequestHead {
    pub(crate) fn new(method: Method, version: Version, target: String, headers: HeaderMap) -> Self {
        Self { method, version, target, headers }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The raw request target as it appeared on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The path portion of the target, without the query string.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// The query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the connection should stay open after this exchange.
    ///
    /// A `Connection: close` header always closes; `Connection: keep-alive`
    /// always keeps the connection open; otherwise the version default
    /// applies.
    pub fn keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(value) if value.trim().eq_ignore_ascii_case("close") => false,
            Some(value) if value.trim().eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version.default_keep_alive(),
        }
    }

    /// Attaches a body, producing the full [`Request`].
    pub(crate) fn with_body(self, body: BodyBuffer) -> Request {
        Request { head: self, body }
    }
}

/// A complete request: head plus incrementally arriving body.
#[derive(Debug)]
pub struct Request {
    head: RequestHead,
    body: BodyBuffer,
}

impl Request {
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> Method {
        self.head.method()
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn body_mut(&mut self) -> &mut BodyBuffer {
        &mut self.body
    }

    pub fn into_parts(self) -> (RequestHead, BodyBuffer) {
        (self.head, self.body)
    }
}
