//! Streaming response writer handed to request handlers.

use std::fmt;

use http::StatusCode;
use tokio::sync::oneshot;
use tracing::debug;

use crate::codec::body_encoder::BodyEncoder;
use crate::connection::writer::WriteSink;
use crate::connection::BoxWriter;
use crate::date;
use crate::protocol::{SendError, Version};

/// Name reported in the `Server:` header when the handler sets none.
const SERVER_NAME: &str = concat!("lean-http/", env!("CARGO_PKG_VERSION"));

/// How the response ended, reported back to the connection.
///
/// `Finished` returns the write sink so the connection can reuse it for the
/// next request on a kept-alive connection.
pub(crate) enum Completion {
    Finished { sink: WriteSink<BoxWriter>, force_close: bool },
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    AwaitingStart,
    Headers,
    Body,
    Trailers,
    Finished,
    Aborted,
}

/// Writes one response to the peer, incrementally.
///
/// The writer enforces ordering at runtime: `start`, then `header` calls,
/// then body writes (optionally followed by trailers on a chunked body),
/// then exactly one `finish`. Breaking that order is a bug in the calling
/// handler and panics with an `http violation:` message; the panic is caught
/// at the scheduler boundary and the connection is torn down.
///
/// Dropping the writer without calling [`finish`](Self::finish) aborts the
/// response and kills the connection.
///
/// Framing is decided when the first body byte (or `finish`) forces the
/// headers out: an explicit `Content-Length` produces a counted body,
/// HTTP/1.1 otherwise defaults to chunked, and HTTP/1.0 falls back to
/// close-delimited streaming. `Date:` and `Server:` headers are added unless
/// the handler set its own.
pub struct ResponseWriter {
    state: WriteState,
    version: Version,
    keep_alive: bool,
    force_close: bool,
    content_length: Option<u64>,
    te_sent: bool,
    te_chunked: bool,
    connection_sent: bool,
    date_sent: bool,
    server_sent: bool,
    encoder: Option<BodyEncoder>,
    sink: Option<WriteSink<BoxWriter>>,
    done: Option<oneshot::Sender<Completion>>,
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("state", &self.state)
            .field("version", &self.version)
            .field("keep_alive", &self.keep_alive)
            .field("force_close", &self.force_close)
            .finish_non_exhaustive()
    }
}

#[cold]
fn violation(message: &str) -> ! {
    panic!("http violation: {message}");
}

impl ResponseWriter {
    pub(crate) fn new(
        version: Version,
        keep_alive: bool,
        sink: WriteSink<BoxWriter>,
        done: oneshot::Sender<Completion>,
    ) -> Self {
        Self {
            state: WriteState::AwaitingStart,
            version,
            keep_alive,
            force_close: false,
            content_length: None,
            te_sent: false,
            te_chunked: false,
            connection_sent: false,
            date_sent: false,
            server_sent: false,
            encoder: None,
            sink: Some(sink),
            done: Some(done),
        }
    }

    /// The version of the request being answered.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Begins the response with the canonical reason phrase for `status`.
    pub fn start(&mut self, status: StatusCode) {
        let reason = status.canonical_reason().unwrap_or("Unknown");
        self.start_with_reason(status, reason);
    }

    /// Begins the response with a custom reason phrase.
    pub fn start_with_reason(&mut self, status: StatusCode, reason: &str) {
        if self.state != WriteState::AwaitingStart {
            violation("response already started");
        }
        let version = self.version;
        let buf = self.sink_mut().buffer();
        buf.extend_from_slice(version.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(status.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(reason.as_bytes());
        buf.extend_from_slice(b"\r\n");
        self.state = WriteState::Headers;
    }

    /// Adds a response header. Legal only between `start` and the first body
    /// write.
    pub fn header(&mut self, name: &str, value: &str) {
        match self.state {
            WriteState::Headers => {}
            WriteState::AwaitingStart => violation("response has not been started"),
            WriteState::Body | WriteState::Trailers => violation("header sent after body data"),
            WriteState::Finished => violation("response already finished"),
            WriteState::Aborted => violation("response aborted"),
        }

        if name.eq_ignore_ascii_case("content-length") {
            let Ok(length) = value.trim().parse::<u64>() else {
                violation("invalid content-length value");
            };
            self.content_length = Some(length);
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            self.te_sent = true;
            self.te_chunked = value.to_ascii_lowercase().contains("chunked");
        } else if name.eq_ignore_ascii_case("connection") {
            self.connection_sent = true;
            if value.trim().eq_ignore_ascii_case("close") {
                self.force_close = true;
            }
        } else if name.eq_ignore_ascii_case("date") {
            self.date_sent = true;
        } else if name.eq_ignore_ascii_case("server") {
            self.server_sent = true;
        }

        Self::put_header_line(self.sink_mut().buffer(), name.as_bytes(), value.as_bytes());
    }

    /// Streams a run of body bytes, applying the response framing.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), SendError> {
        match self.state {
            WriteState::Headers => self.end_headers(),
            WriteState::Body => {}
            WriteState::AwaitingStart => violation("response has not been started"),
            WriteState::Trailers => violation("body data after trailers"),
            WriteState::Finished => violation("response already finished"),
            WriteState::Aborted => violation("response aborted"),
        }

        let Some(sink) = self.sink.as_mut() else {
            violation("response is closed");
        };
        let Some(encoder) = self.encoder.as_mut() else {
            violation("response has no body framing");
        };
        encoder.encode_data(data, sink.buffer());
        let flushed = sink.flush().await;
        if let Err(error) = flushed {
            self.abort();
            return Err(error.into());
        }
        Ok(())
    }

    /// Adds a trailer field. Legal only while streaming a chunked body.
    pub fn trailer(&mut self, name: &str, value: &str) {
        match self.state {
            WriteState::Body => {
                if !matches!(self.encoder, Some(BodyEncoder::Chunked { .. })) {
                    violation("trailers require a chunked body");
                }
                let Some(sink) = self.sink.as_mut() else {
                    violation("response is closed");
                };
                let Some(encoder) = self.encoder.as_mut() else {
                    violation("response has no body framing");
                };
                encoder.begin_trailers(sink.buffer());
                self.state = WriteState::Trailers;
            }
            WriteState::Trailers => {}
            WriteState::AwaitingStart | WriteState::Headers => {
                violation("trailer before body data")
            }
            WriteState::Finished => violation("response already finished"),
            WriteState::Aborted => violation("response aborted"),
        }
        Self::put_header_line(self.sink_mut().buffer(), name.as_bytes(), value.as_bytes());
    }

    /// Completes the response. Every response must end with exactly one
    /// `finish` (or be aborted).
    pub async fn finish(&mut self) -> Result<(), SendError> {
        match self.state {
            WriteState::AwaitingStart => violation("response has not been started"),
            WriteState::Finished => violation("response already finished"),
            // The connection is already gone; nothing left to complete.
            WriteState::Aborted => return Ok(()),
            WriteState::Headers => {
                if self.content_length.is_none() && !self.te_sent {
                    self.header("Content-Length", "0");
                }
                self.end_headers();
            }
            WriteState::Body | WriteState::Trailers => {}
        }

        {
            let Some(sink) = self.sink.as_mut() else {
                violation("response is closed");
            };
            let Some(encoder) = self.encoder.as_mut() else {
                violation("response has no body framing");
            };
            encoder.finish(sink.buffer());
        }

        let flushed = match self.sink.as_mut() {
            Some(sink) => sink.flush().await,
            None => violation("response is closed"),
        };
        if let Err(error) = flushed {
            self.abort();
            return Err(error.into());
        }

        self.state = WriteState::Finished;
        self.encoder = None;
        if let (Some(done), Some(sink)) = (self.done.take(), self.sink.take()) {
            let _ = done.send(Completion::Finished { sink, force_close: self.force_close });
        }
        Ok(())
    }

    /// Abandons the response and kills the connection. Idempotent.
    pub fn abort(&mut self) {
        if matches!(self.state, WriteState::Finished | WriteState::Aborted) {
            return;
        }
        self.state = WriteState::Aborted;
        self.encoder = None;
        // Dropping the sink drops the transport's write half.
        self.sink = None;
        if let Some(done) = self.done.take() {
            let _ = done.send(Completion::Aborted);
        }
    }

    /// Flushes headers and decides the body framing.
    fn end_headers(&mut self) {
        let mut extra_te = false;
        let encoder = if self.te_sent {
            if self.te_chunked {
                BodyEncoder::chunked()
            } else {
                BodyEncoder::CloseDelimited
            }
        } else if let Some(length) = self.content_length {
            BodyEncoder::length(length)
        } else if self.version == Version::Http11 {
            extra_te = true;
            BodyEncoder::chunked()
        } else {
            BodyEncoder::CloseDelimited
        };
        if encoder.forces_close() {
            self.force_close = true;
        }

        let version = self.version;
        let keep_alive = self.keep_alive && !self.force_close;
        let date_sent = self.date_sent;
        let server_sent = self.server_sent;
        let connection_sent = self.connection_sent;
        let date = if date_sent { None } else { Some(date::http_date()) };

        let buf = self.sink_mut().buffer();
        if extra_te {
            Self::put_header_line(buf, b"Transfer-Encoding", b"chunked");
        }
        // HTTP/1.0 peers assume close; a persistent connection must be
        // announced explicitly.
        if version == Version::Http10 && keep_alive && !connection_sent {
            Self::put_header_line(buf, b"Connection", b"keep-alive");
        }
        if let Some(date) = date {
            Self::put_header_line(buf, b"Date", &date);
        }
        if !server_sent {
            Self::put_header_line(buf, b"Server", SERVER_NAME.as_bytes());
        }
        buf.extend_from_slice(b"\r\n");

        self.encoder = Some(encoder);
        self.state = WriteState::Body;
    }

    fn put_header_line(buf: &mut bytes::BytesMut, name: &[u8], value: &[u8]) {
        buf.extend_from_slice(name);
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value);
        buf.extend_from_slice(b"\r\n");
    }

    fn sink_mut(&mut self) -> &mut WriteSink<BoxWriter> {
        match self.sink.as_mut() {
            Some(sink) => sink,
            None => violation("response is closed"),
        }
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        if !matches!(self.state, WriteState::Finished | WriteState::Aborted) {
            debug!("response dropped before finish, aborting connection");
            self.abort();
        }
    }
}
