//! One served connection.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use http::StatusCode;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{ParserConfig, RequestParser};
use crate::connection::response::{Completion, ResponseWriter};
use crate::connection::writer::WriteSink;
use crate::connection::BoxWriter;
use crate::date;
use crate::handler::Router;
use crate::protocol::body;
use crate::protocol::{
    BodyError, BodyFrame, BodyKind, HttpError, ParseError, ParseEvent, ProtocolError, RequestHead,
    SendError,
};
use crate::scheduler::Scheduler;

/// Per-connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long the connection may sit without a complete request head
    /// before it is closed. Also caps slow header transmission.
    pub idle_timeout: Duration,
    pub parser: ParserConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { idle_timeout: Duration::from_secs(30), parser: ParserConfig::default() }
    }
}

/// Drives one transport connection through its request/response exchanges.
///
/// The connection task owns the read half for its whole life. The write half
/// travels: it is lent to the [`ResponseWriter`] for the duration of each
/// exchange and comes back through the completion channel, so a handler can
/// stream its response from a worker while the connection keeps pumping body
/// bytes to it.
///
/// Requests are strictly sequential. A second request head arriving before
/// the current response has completed is treated as a protocol violation and
/// kills the connection.
pub struct Connection<R> {
    framed: FramedRead<R, RequestParser>,
    sink: Option<WriteSink<BoxWriter>>,
    config: ConnectionConfig,
    cancel: CancellationToken,
}

impl<R> fmt::Debug for Connection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("writable", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin> Connection<R> {
    pub fn new(reader: R, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self::with_config(reader, writer, ConnectionConfig::default(), CancellationToken::new())
    }

    pub fn with_config(
        reader: R,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        config: ConnectionConfig,
        cancel: CancellationToken,
    ) -> Self {
        let parser = RequestParser::new(config.parser.clone());
        Self {
            framed: FramedRead::new(reader, parser),
            sink: Some(WriteSink::new(Box::new(writer))),
            config,
            cancel,
        }
    }

    /// Token that cancels this connection when triggered. The server keeps a
    /// clone per connection to sweep them all at shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serves requests until the peer disconnects, the connection idles out,
    /// is cancelled, or a protocol error ends it.
    pub async fn serve(mut self, scheduler: &Scheduler, router: Arc<dyn Router>) -> Result<(), HttpError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("connection cancelled");
                    return Ok(());
                }
                next = timeout(self.config.idle_timeout, self.framed.next()) => match next {
                    Err(_) => {
                        info!("closing idle connection");
                        return Ok(());
                    }
                    Ok(event) => event,
                },
            };

            match event {
                None => {
                    debug!("peer closed the connection");
                    return Ok(());
                }
                Some(Err(error)) => return self.reject(error).await,
                Some(Ok(ParseEvent::Head(head, kind))) => {
                    if !self.dispatch(head, kind, scheduler, Arc::clone(&router)).await? {
                        return Ok(());
                    }
                }
                Some(Ok(ParseEvent::Body(_))) => {
                    // `dispatch` drains every frame through `End` before the
                    // loop comes back here.
                    return Err(ParseError::Protocol(ProtocolError::bad_request(
                        "body frame outside a request",
                    ))
                    .into());
                }
            }
        }
    }

    /// Runs one exchange. Returns `Ok(true)` when the connection may serve
    /// another request.
    async fn dispatch(
        &mut self,
        head: RequestHead,
        kind: BodyKind,
        scheduler: &Scheduler,
        router: Arc<dyn Router>,
    ) -> Result<bool, HttpError> {
        let version = head.version();
        let keep_alive = head.keep_alive();
        debug!(method = %head.method(), target = %head.target(), %version, "dispatching request");

        let Some(sink) = self.sink.take() else {
            return Err(SendError::Io {
                source: io::Error::new(io::ErrorKind::NotConnected, "write half unavailable"),
            }
            .into());
        };
        let (done_tx, mut done_rx) = oneshot::channel();
        let writer = ResponseWriter::new(version, keep_alive, sink, done_tx);

        let (body_tx, body_rx) = if kind.is_none() {
            (None, body::empty_body())
        } else {
            let (tx, rx) = body::body_channel();
            (Some(tx), rx)
        };
        let request = head.with_body(body_rx);

        let job = async move {
            let mut writer = writer;
            match router.resolve(request.head()) {
                Some(handler) => {
                    if let Err(error) = handler.call(request, writer).await {
                        warn!(error = %error, "handler failed");
                    }
                }
                None => {
                    writer.start(StatusCode::NOT_FOUND);
                    if let Err(error) = writer.finish().await {
                        debug!(error = %error, "failed to send 404");
                    }
                }
            }
        };
        if scheduler.spawn(job).await.is_err() {
            debug!("scheduler unavailable, closing connection");
            return Ok(false);
        }

        // Pump body frames to the handler while waiting for the response to
        // complete. Reading continues past the body's end so a pipelined
        // request is caught instead of sitting in the buffer.
        let mut body_tx = body_tx;
        let mut body_done = body_tx.is_none();
        let mut read_open = true;

        let completion = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("connection cancelled mid-request");
                    return Ok(false);
                }
                completion = &mut done_rx => break completion,
                event = self.framed.next(), if read_open => match event {
                    Some(Ok(ParseEvent::Body(BodyFrame::Data(data)))) => {
                        let delivered = match body_tx.as_ref() {
                            Some(tx) => tx.data(data).await,
                            None => true,
                        };
                        if !delivered {
                            // Handler dropped the body; discard the rest.
                            body_tx = None;
                        }
                    }
                    Some(Ok(ParseEvent::Body(BodyFrame::End))) => {
                        body_done = true;
                        body_tx = None;
                    }
                    Some(Ok(ParseEvent::Head(..))) => {
                        warn!("pipelined request before response completed, killing connection");
                        return Err(ParseError::Protocol(ProtocolError::bad_request(
                            "pipelined request before response completed",
                        ))
                        .into());
                    }
                    Some(Err(error)) => {
                        if let Some(tx) = body_tx.take() {
                            let cause = match &error {
                                ParseError::Protocol(protocol) => {
                                    BodyError::Protocol(protocol.clone())
                                }
                                ParseError::Io { .. } => BodyError::Aborted,
                            };
                            tx.fail(cause).await;
                        }
                        return Err(error.into());
                    }
                    None => {
                        read_open = false;
                        if !body_done {
                            if let Some(tx) = body_tx.take() {
                                tx.fail(BodyError::Aborted).await;
                            }
                            return Err(ParseError::Io {
                                source: io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    "connection closed mid-body",
                                ),
                            }
                            .into());
                        }
                    }
                },
            }
        };

        match completion {
            Ok(Completion::Finished { sink, force_close }) => {
                // The handler may have finished without consuming the body;
                // drain to the boundary before rearming.
                if !body_done && !self.drain_body().await? {
                    return Ok(false);
                }
                self.sink = Some(sink);
                if force_close || !keep_alive {
                    debug!("closing connection after response");
                    return Ok(false);
                }
                // Fresh parser per request; a failed one is never reused.
                *self.framed.decoder_mut() = RequestParser::new(self.config.parser.clone());
                Ok(true)
            }
            Ok(Completion::Aborted) | Err(_) => {
                debug!("response aborted, closing connection");
                Ok(false)
            }
        }
    }

    /// Discards body frames until the request boundary. Returns `Ok(false)`
    /// if the peer went away first.
    async fn drain_body(&mut self) -> Result<bool, HttpError> {
        loop {
            match timeout(self.config.idle_timeout, self.framed.next()).await {
                Ok(Some(Ok(ParseEvent::Body(BodyFrame::Data(_))))) => {}
                Ok(Some(Ok(ParseEvent::Body(BodyFrame::End)))) => return Ok(true),
                Ok(Some(Ok(ParseEvent::Head(..)))) => {
                    return Err(ParseError::Protocol(ProtocolError::bad_request(
                        "pipelined request before response completed",
                    ))
                    .into());
                }
                Ok(Some(Err(error))) => return Err(error.into()),
                Ok(None) => return Ok(false),
                Err(_) => {
                    info!("closing connection, body drain timed out");
                    return Ok(false);
                }
            }
        }
    }

    /// Answers a malformed request with a bare error response, then reports
    /// the failure so the connection closes.
    async fn reject(&mut self, error: ParseError) -> Result<(), HttpError> {
        if let ParseError::Protocol(protocol) = &error {
            warn!(error = %protocol, "rejecting malformed request");
            let status = protocol.status();
            if let Some(sink) = self.sink.as_mut() {
                let buf = sink.buffer();
                buf.extend_from_slice(b"HTTP/1.1 ");
                buf.extend_from_slice(status.as_str().as_bytes());
                buf.extend_from_slice(b" ");
                buf.extend_from_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
                buf.extend_from_slice(b"\r\nDate: ");
                buf.extend_from_slice(&date::http_date());
                buf.extend_from_slice(b"\r\nServer: lean-http/");
                buf.extend_from_slice(env!("CARGO_PKG_VERSION").as_bytes());
                buf.extend_from_slice(b"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                // Best effort; the connection is closing either way.
                let _ = sink.flush().await;
            }
        }
        Err(error.into())
    }
}
