//! Incremental HTTP/1.x request parser.
//!
//! The parser is a byte-at-a-time state machine implementing
//! [`tokio_util::codec::Decoder`]. It consumes arbitrarily split input and
//! yields [`ParseEvent`]s: one `Head` per request, followed by body `Data`
//! frames and a final `End`. Body bytes are sliced out of the input buffer
//! without copying; chunked framing is removed before the data is surfaced.
//!
//! A parse error is terminal. The parser enters a failed state that eats all
//! further input and re-reports the same error; the connection replaces the
//! parser instance before reading the next request.

use std::mem;

use bytes::{Buf, BytesMut};
use serde::Deserialize;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{
    BodyFrame, BodyKind, HeaderMap, Method, ParseError, ParseEvent, ProtocolError, RequestHead,
    Version,
};
use crate::utils::ensure;

const SP: u8 = b' ';
const HT: u8 = b'\t';
const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Longest method token accepted before the parser gives up on the line.
const METHOD_TOKEN_MAX: usize = 16;

/// Limits enforced during parsing.
///
/// Each limit maps to a distinct [`ProtocolError`] so the connection can
/// answer with the matching status code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum request-target length in bytes.
    pub uri_max: usize,
    /// Maximum header name length in bytes.
    pub header_name_max: usize,
    /// Maximum header value length in bytes, after folding.
    pub header_value_max: usize,
    /// Maximum number of header lines, trailers included.
    pub header_count_max: usize,
    /// Maximum entity size in bytes, for both counted and chunked bodies.
    pub entity_max: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            uri_max: 4096,
            header_name_max: 128,
            header_value_max: 4096,
            header_count_max: 128,
            entity_max: 10 * 1024 * 1024,
        }
    }
}

/// Position of the parser within a request.
///
/// States that need bookkeeping carry it as payload; the string accumulators
/// for the target and the current header line live on the parser itself.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParserState {
    /// Between requests. Stray CR/LF before the request line is skipped.
    Start,
    Method,
    UriStart,
    Uri,
    /// Matching the literal `HTTP/` after the request target.
    VersionPrefix { matched: usize },
    VersionMajor,
    VersionDot,
    VersionMinor,
    RequestLineEnd { seen_cr: bool },
    /// At the start of a header line; CR/LF here ends the header section.
    HeaderLineStart,
    HeaderName,
    HeaderValueStart,
    HeaderValue,
    HeaderValueCr,
    /// At the first byte after a header line; whitespace folds, anything
    /// else commits the accumulated header.
    HeaderLineEnd,
    HeadersAlmostEnd,
    ChunkSize { size: u64, any: bool },
    ChunkSizeLws { size: u64 },
    ChunkExtension { size: u64 },
    ChunkSizeAlmostEnd { size: u64 },
    ChunkData { remaining: u64 },
    ChunkDataEnd,
    ChunkDataAlmostEnd,
    IdentityBody { remaining: u64 },
    /// Request complete; the next decode call emits `End` and rearms.
    Done,
    /// Terminal. All further input is discarded.
    Failed(ProtocolError),
}

/// Outcome of feeding one byte to the state machine.
enum Step {
    /// Byte consumed.
    Consumed,
    /// State changed; the same byte must be fed again.
    Hold,
    /// Byte consumed and the head is complete.
    Head(RequestHead, BodyKind),
}

#[derive(Debug)]
pub struct RequestParser {
    config: ParserConfig,
    state: ParserState,
    method: Option<Method>,
    version: Version,
    target: String,
    headers: HeaderMap,
    name_buf: String,
    value_buf: String,
    header_count: usize,
    in_trailers: bool,
    body_total: u64,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl RequestParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            state: ParserState::Start,
            method: None,
            version: Version::Http11,
            target: String::new(),
            headers: HeaderMap::new(),
            name_buf: String::new(),
            value_buf: String::new(),
            header_count: 0,
            in_trailers: false,
            body_total: 0,
        }
    }

    /// Resets per-request accumulation after a request completed.
    fn rearm(&mut self) {
        self.state = ParserState::Start;
        self.method = None;
        self.target.clear();
        self.headers = HeaderMap::new();
        self.name_buf.clear();
        self.value_buf.clear();
        self.header_count = 0;
        self.in_trailers = false;
        self.body_total = 0;
    }

    fn step(&mut self, b: u8) -> Result<Step, ProtocolError> {
        match self.state.clone() {
            ParserState::Start => {
                if b == CR || b == LF {
                    return Ok(Step::Consumed);
                }
                self.name_buf.clear();
                self.state = ParserState::Method;
                Ok(Step::Hold)
            }
            ParserState::Method => {
                if b == SP {
                    let method = self.name_buf.parse::<Method>()?;
                    self.method = Some(method);
                    self.state = ParserState::UriStart;
                    return Ok(Step::Consumed);
                }
                ensure!(
                    b.is_ascii_uppercase(),
                    ProtocolError::bad_request("invalid character in method")
                );
                ensure!(
                    self.name_buf.len() < METHOD_TOKEN_MAX,
                    ProtocolError::not_implemented(self.name_buf.as_str())
                );
                self.name_buf.push(b as char);
                Ok(Step::Consumed)
            }
            ParserState::UriStart => {
                ensure!(
                    !matches!(b, SP | HT | CR | LF),
                    ProtocolError::bad_request("empty request target")
                );
                self.state = ParserState::Uri;
                Ok(Step::Hold)
            }
            ParserState::Uri => {
                if b == SP {
                    self.state = ParserState::VersionPrefix { matched: 0 };
                    return Ok(Step::Consumed);
                }
                ensure!(
                    (0x21..=0x7e).contains(&b),
                    ProtocolError::bad_request("invalid character in request target")
                );
                ensure!(
                    self.target.len() < self.config.uri_max,
                    ProtocolError::UriTooLong { max: self.config.uri_max }
                );
                self.target.push(b as char);
                Ok(Step::Consumed)
            }
            ParserState::VersionPrefix { matched } => {
                ensure!(
                    b == b"HTTP/"[matched],
                    ProtocolError::bad_request("malformed http version")
                );
                self.state = if matched == 4 {
                    ParserState::VersionMajor
                } else {
                    ParserState::VersionPrefix { matched: matched + 1 }
                };
                Ok(Step::Consumed)
            }
            ParserState::VersionMajor => {
                match b {
                    b'1' => self.state = ParserState::VersionDot,
                    b'0'..=b'9' => return Err(ProtocolError::VersionNotSupported),
                    _ => return Err(ProtocolError::bad_request("malformed http version")),
                }
                Ok(Step::Consumed)
            }
            ParserState::VersionDot => {
                ensure!(b == b'.', ProtocolError::bad_request("malformed http version"));
                self.state = ParserState::VersionMinor;
                Ok(Step::Consumed)
            }
            ParserState::VersionMinor => {
                match b {
                    b'0' => self.version = Version::Http10,
                    b'1' => self.version = Version::Http11,
                    b'2'..=b'9' => return Err(ProtocolError::VersionNotSupported),
                    _ => return Err(ProtocolError::bad_request("malformed http version")),
                }
                self.state = ParserState::RequestLineEnd { seen_cr: false };
                Ok(Step::Consumed)
            }
            ParserState::RequestLineEnd { seen_cr } => {
                match b {
                    CR if !seen_cr => self.state = ParserState::RequestLineEnd { seen_cr: true },
                    LF => self.state = ParserState::HeaderLineStart,
                    _ => return Err(ProtocolError::bad_request("malformed request line ending")),
                }
                Ok(Step::Consumed)
            }
            ParserState::HeaderLineStart => match b {
                CR => {
                    self.state = ParserState::HeadersAlmostEnd;
                    Ok(Step::Consumed)
                }
                LF => self.end_of_headers(),
                _ => {
                    self.name_buf.clear();
                    self.state = ParserState::HeaderName;
                    Ok(Step::Hold)
                }
            },
            ParserState::HeaderName => {
                if b == b':' {
                    ensure!(
                        !self.name_buf.is_empty(),
                        ProtocolError::bad_request("empty header name")
                    );
                    self.value_buf.clear();
                    self.state = ParserState::HeaderValueStart;
                    return Ok(Step::Consumed);
                }
                ensure!(
                    (0x21..=0x7e).contains(&b),
                    ProtocolError::bad_request("invalid character in header name")
                );
                ensure!(
                    self.name_buf.len() < self.config.header_name_max,
                    ProtocolError::fields_too_large("header name exceeds limit")
                );
                self.name_buf.push(b as char);
                Ok(Step::Consumed)
            }
            ParserState::HeaderValueStart => {
                if b == SP || b == HT {
                    return Ok(Step::Consumed);
                }
                self.state = ParserState::HeaderValue;
                Ok(Step::Hold)
            }
            ParserState::HeaderValue => {
                match b {
                    CR => self.state = ParserState::HeaderValueCr,
                    LF => self.state = ParserState::HeaderLineEnd,
                    HT | 0x20..=0x7e => {
                        ensure!(
                            self.value_buf.len() < self.config.header_value_max,
                            ProtocolError::fields_too_large("header value exceeds limit")
                        );
                        self.value_buf.push(b as char);
                    }
                    _ => return Err(ProtocolError::bad_request("invalid character in header value")),
                }
                Ok(Step::Consumed)
            }
            ParserState::HeaderValueCr => {
                ensure!(b == LF, ProtocolError::bad_request("malformed header line ending"));
                self.state = ParserState::HeaderLineEnd;
                Ok(Step::Consumed)
            }
            ParserState::HeaderLineEnd => {
                if b == SP || b == HT {
                    // Obsolete line folding: the continuation joins the value
                    // the same way a repeated header would.
                    self.value_buf.push_str(", ");
                    self.state = ParserState::HeaderValueStart;
                    return Ok(Step::Consumed);
                }
                self.commit_header()?;
                match b {
                    CR => {
                        self.state = ParserState::HeadersAlmostEnd;
                        Ok(Step::Consumed)
                    }
                    LF => self.end_of_headers(),
                    _ => {
                        self.name_buf.clear();
                        self.state = ParserState::HeaderName;
                        Ok(Step::Hold)
                    }
                }
            }
            ParserState::HeadersAlmostEnd => {
                ensure!(b == LF, ProtocolError::bad_request("malformed header section ending"));
                self.end_of_headers()
            }
            ParserState::ChunkSize { size, any } => match b {
                b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' => {
                    let digit = hex_value(b);
                    let size = size
                        .checked_mul(16)
                        .and_then(|s| s.checked_add(digit))
                        .ok_or(ProtocolError::bad_request("chunk size overflow"))?;
                    self.state = ParserState::ChunkSize { size, any: true };
                    Ok(Step::Consumed)
                }
                b';' if any => {
                    self.state = ParserState::ChunkExtension { size };
                    Ok(Step::Consumed)
                }
                SP | HT if any => {
                    self.state = ParserState::ChunkSizeLws { size };
                    Ok(Step::Consumed)
                }
                CR if any => {
                    self.state = ParserState::ChunkSizeAlmostEnd { size };
                    Ok(Step::Consumed)
                }
                LF if any => self.chunk_size_done(size),
                _ => Err(ProtocolError::bad_request("invalid chunk size")),
            },
            ParserState::ChunkSizeLws { size } => match b {
                SP | HT => Ok(Step::Consumed),
                b';' => {
                    self.state = ParserState::ChunkExtension { size };
                    Ok(Step::Consumed)
                }
                CR => {
                    self.state = ParserState::ChunkSizeAlmostEnd { size };
                    Ok(Step::Consumed)
                }
                LF => self.chunk_size_done(size),
                _ => Err(ProtocolError::bad_request("invalid chunk size")),
            },
            ParserState::ChunkExtension { size } => match b {
                CR => {
                    self.state = ParserState::ChunkSizeAlmostEnd { size };
                    Ok(Step::Consumed)
                }
                LF => Err(ProtocolError::bad_request("malformed chunk extension")),
                _ => Ok(Step::Consumed),
            },
            ParserState::ChunkSizeAlmostEnd { size } => {
                ensure!(b == LF, ProtocolError::bad_request("malformed chunk size line"));
                self.chunk_size_done(size)
            }
            ParserState::ChunkDataEnd => match b {
                CR => {
                    self.state = ParserState::ChunkDataAlmostEnd;
                    Ok(Step::Consumed)
                }
                LF => {
                    self.state = ParserState::ChunkSize { size: 0, any: false };
                    Ok(Step::Consumed)
                }
                _ => Err(ProtocolError::bad_request("malformed chunk terminator")),
            },
            ParserState::ChunkDataAlmostEnd => {
                ensure!(b == LF, ProtocolError::bad_request("malformed chunk terminator"));
                self.state = ParserState::ChunkSize { size: 0, any: false };
                Ok(Step::Consumed)
            }
            // Bulk and terminal states are handled in `decode` before bytes
            // reach the per-byte machine.
            ParserState::IdentityBody { .. }
            | ParserState::ChunkData { .. }
            | ParserState::Done
            | ParserState::Failed(_) => {
                Err(ProtocolError::bad_request("parser state machine out of sync"))
            }
        }
    }

    /// Commits the accumulated header line, or discards it when it belongs
    /// to a chunked trailer section.
    fn commit_header(&mut self) -> Result<(), ProtocolError> {
        ensure!(
            self.header_count < self.config.header_count_max,
            ProtocolError::fields_too_large("too many header fields")
        );
        self.header_count += 1;
        let name = mem::take(&mut self.name_buf);
        let value = mem::take(&mut self.value_buf);
        if self.in_trailers {
            trace!(name, "discarding request trailer");
        } else {
            self.headers.append(name, value);
        }
        Ok(())
    }

    fn end_of_headers(&mut self) -> Result<Step, ProtocolError> {
        if self.in_trailers {
            self.state = ParserState::Done;
            return Ok(Step::Consumed);
        }
        let kind = self.entity_kind()?;
        let Some(method) = self.method.take() else {
            return Err(ProtocolError::bad_request("missing method"));
        };
        trace!(%method, target = %self.target, version = %self.version, ?kind, "request head complete");
        let head = RequestHead::new(
            method,
            self.version,
            mem::take(&mut self.target),
            mem::take(&mut self.headers),
        );
        self.state = match kind {
            BodyKind::None => ParserState::Done,
            BodyKind::Identity { length } => ParserState::IdentityBody { remaining: length },
            BodyKind::Chunked => ParserState::ChunkSize { size: 0, any: false },
        };
        Ok(Step::Head(head, kind))
    }

    /// Decides the entity framing from the completed header section.
    ///
    /// A `Transfer-Encoding` other than `identity` selects chunked framing
    /// and takes precedence over any `Content-Length`.
    fn entity_kind(&self) -> Result<BodyKind, ProtocolError> {
        if let Some(te) = self.headers.get("transfer-encoding") {
            if !te.trim().eq_ignore_ascii_case("identity") {
                return Ok(BodyKind::Chunked);
            }
        }
        if let Some(value) = self.headers.get("content-length") {
            let length: u64 = value
                .trim()
                .parse()
                .map_err(|_| ProtocolError::bad_request("invalid content-length"))?;
            ensure!(
                length <= self.config.entity_max,
                ProtocolError::EntityTooLarge { size: length, max: self.config.entity_max }
            );
            if length > 0 {
                return Ok(BodyKind::Identity { length });
            }
        }
        Ok(BodyKind::None)
    }

    fn chunk_size_done(&mut self, size: u64) -> Result<Step, ProtocolError> {
        if size == 0 {
            // Last chunk. Trailers reuse the header machine and are
            // discarded as they commit.
            self.in_trailers = true;
            self.state = ParserState::HeaderLineStart;
        } else {
            self.body_total = self.body_total.saturating_add(size);
            ensure!(
                self.body_total <= self.config.entity_max,
                ProtocolError::EntityTooLarge {
                    size: self.body_total,
                    max: self.config.entity_max
                }
            );
            self.state = ParserState::ChunkData { remaining: size };
        }
        Ok(Step::Consumed)
    }
}

fn hex_value(b: u8) -> u64 {
    match b {
        b'0'..=b'9' => u64::from(b - b'0'),
        b'a'..=b'f' => u64::from(b - b'a' + 10),
        _ => u64::from(b - b'A' + 10),
    }
}

impl Decoder for RequestParser {
    type Item = ParseEvent;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ParseEvent>, ParseError> {
        loop {
            match &mut self.state {
                ParserState::Failed(error) => {
                    let error = error.clone();
                    src.clear();
                    return Err(error.into());
                }
                ParserState::Done => {
                    self.rearm();
                    return Ok(Some(ParseEvent::Body(BodyFrame::End)));
                }
                ParserState::IdentityBody { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = (*remaining).min(src.len() as u64) as usize;
                    *remaining -= take as u64;
                    let finished = *remaining == 0;
                    let data = src.split_to(take).freeze();
                    if finished {
                        self.state = ParserState::Done;
                    }
                    return Ok(Some(ParseEvent::Body(BodyFrame::Data(data))));
                }
                ParserState::ChunkData { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = (*remaining).min(src.len() as u64) as usize;
                    *remaining -= take as u64;
                    let finished = *remaining == 0;
                    let data = src.split_to(take).freeze();
                    if finished {
                        self.state = ParserState::ChunkDataEnd;
                    }
                    return Ok(Some(ParseEvent::Body(BodyFrame::Data(data))));
                }
                _ => {}
            }

            let Some(&byte) = src.first() else {
                return Ok(None);
            };
            match self.step(byte) {
                Ok(Step::Consumed) => src.advance(1),
                Ok(Step::Hold) => {}
                Ok(Step::Head(head, kind)) => {
                    src.advance(1);
                    return Ok(Some(ParseEvent::Head(head, kind)));
                }
                Err(error) => {
                    self.state = ParserState::Failed(error.clone());
                    src.clear();
                    return Err(error.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Method;

    /// Feeds the whole input at once and collects every event until the
    /// parser wants more bytes.
    fn events(parser: &mut RequestParser, input: &[u8]) -> Vec<ParseEvent> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(event) = parser.decode(&mut buf).unwrap() {
            out.push(event);
        }
        out
    }

    fn parse_error(input: &[u8]) -> ProtocolError {
        let mut parser = RequestParser::default();
        let mut buf = BytesMut::from(input);
        loop {
            match parser.decode(&mut buf) {
                Ok(Some(_)) => {}
                Ok(None) => panic!("expected a parse error"),
                Err(ParseError::Protocol(error)) => return error,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }

    fn body_of(events: Vec<ParseEvent>) -> (RequestHead, Vec<u8>) {
        let mut iter = events.into_iter();
        let (head, _) = iter.next().unwrap().expect_head();
        let mut body = Vec::new();
        let mut ended = false;
        for event in iter {
            match event.expect_frame() {
                BodyFrame::Data(data) => {
                    assert!(!ended, "data after end");
                    body.extend_from_slice(&data);
                }
                BodyFrame::End => ended = true,
            }
        }
        assert!(ended, "missing end frame");
        (head, body)
    }

    #[test]
    fn simple_get() {
        let mut parser = RequestParser::default();
        let events = events(&mut parser, b"GET /index.html HTTP/1.1\r\nHost: example.test\r\n\r\n");
        let (head, body) = body_of(events);
        assert_eq!(head.method(), Method::Get);
        assert_eq!(head.target(), "/index.html");
        assert_eq!(head.version(), Version::Http11);
        assert_eq!(head.headers().get("host"), Some("example.test"));
        assert!(body.is_empty());
    }

    #[test]
    fn byte_at_a_time_matches_bulk() {
        let input: &[u8] = b"POST /submit HTTP/1.0\r\nContent-Length: 5\r\n\r\nhello";
        let mut parser = RequestParser::default();
        let mut buf = BytesMut::new();
        let mut collected = Vec::new();
        for &b in input {
            buf.extend_from_slice(&[b]);
            while let Some(event) = parser.decode(&mut buf).unwrap() {
                collected.push(event);
            }
        }
        while let Some(event) = parser.decode(&mut buf).unwrap() {
            collected.push(event);
        }
        let (head, body) = body_of(collected);
        assert_eq!(head.method(), Method::Post);
        assert_eq!(head.version(), Version::Http10);
        assert_eq!(body, b"hello");
    }

    #[test]
    fn leading_crlf_is_skipped() {
        let mut parser = RequestParser::default();
        let events = events(&mut parser, b"\r\n\r\nGET / HTTP/1.1\r\n\r\n");
        let (head, _) = body_of(events);
        assert_eq!(head.target(), "/");
    }

    #[test]
    fn bare_lf_line_endings_are_accepted() {
        let mut parser = RequestParser::default();
        let events = events(&mut parser, b"GET / HTTP/1.1\nHost: a\n\n");
        let (head, _) = body_of(events);
        assert_eq!(head.headers().get("host"), Some("a"));
    }

    #[test]
    fn counted_body_spans_buffers() {
        let mut parser = RequestParser::default();
        let mut buf = BytesMut::new();
        let mut collected = Vec::new();
        for part in [
            &b"POST /u HTTP/1.1\r\nContent-Le"[..],
            &b"ngth: 11\r\n\r\nhello"[..],
            &b" world"[..],
        ] {
            buf.extend_from_slice(part);
            while let Some(event) = parser.decode(&mut buf).unwrap() {
                collected.push(event);
            }
        }
        let (_, body) = body_of(collected);
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn zero_content_length_has_no_body() {
        let mut parser = RequestParser::default();
        let mut events = events(&mut parser, b"POST /u HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        let (_, kind) = events.remove(0).expect_head();
        assert_eq!(kind, BodyKind::None);
        assert_eq!(events.remove(0).expect_frame(), BodyFrame::End);
    }

    #[test]
    fn chunked_body_with_extensions_and_trailers() {
        let mut parser = RequestParser::default();
        let input = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
            5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Checksum: abc\r\n\r\n";
        let events = events(&mut parser, input);
        let (head, body) = body_of(events);
        assert_eq!(body, b"hello world");
        // Trailers are discarded, not merged into the head.
        assert!(!head.headers().contains("x-checksum"));
    }

    #[test]
    fn chunked_byte_at_a_time_matches_bulk() {
        let input: &[u8] = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
            5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Checksum: abc\r\n\r\n";
        let mut parser = RequestParser::default();
        let mut buf = BytesMut::new();
        let mut collected = Vec::new();
        for &b in input {
            buf.extend_from_slice(&[b]);
            while let Some(event) = parser.decode(&mut buf).unwrap() {
                collected.push(event);
            }
        }
        let (head, body) = body_of(collected);
        assert_eq!(body, b"hello world");
        assert!(!head.headers().contains("x-checksum"));

        let mut bulk = RequestParser::default();
        let (bulk_head, bulk_body) = body_of(events(&mut bulk, input));
        assert_eq!(bulk_body, body);
        assert_eq!(bulk_head.target(), head.target());
    }

    #[test]
    fn chunk_sizes_parse_as_hex() {
        let mut parser = RequestParser::default();
        let payload: Vec<u8> = (0..0x1A).map(|i| b'a' + (i % 26)).collect();
        let mut input = b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n1A\r\n".to_vec();
        input.extend_from_slice(&payload);
        input.extend_from_slice(b"\r\n0\r\n\r\n");
        let (_, body) = body_of(events(&mut parser, &input));
        assert_eq!(body, payload);
    }

    #[test]
    fn folded_header_joins_with_comma() {
        let mut parser = RequestParser::default();
        let input = b"GET / HTTP/1.1\r\nX-Long: first\r\n second\r\n\tthird\r\n\r\n";
        let (head, _) = body_of(events(&mut parser, input));
        assert_eq!(head.headers().get("x-long"), Some("first, second, third"));
    }

    #[test]
    fn duplicate_headers_coalesce() {
        let mut parser = RequestParser::default();
        let input = b"GET / HTTP/1.1\r\nAccept: a\r\nAccept: b\r\n\r\n";
        let (head, _) = body_of(events(&mut parser, input));
        assert_eq!(head.headers().get("accept"), Some("a, b"));
    }

    #[test]
    fn two_requests_in_one_buffer_both_parse() {
        let mut parser = RequestParser::default();
        let input = b"GET /one HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\n\r\n";
        let mut collected = events(&mut parser, input).into_iter();
        let (first, _) = collected.next().unwrap().expect_head();
        assert_eq!(first.target(), "/one");
        assert_eq!(collected.next().unwrap().expect_frame(), BodyFrame::End);
        let (second, _) = collected.next().unwrap().expect_head();
        assert_eq!(second.target(), "/two");
        assert_eq!(collected.next().unwrap().expect_frame(), BodyFrame::End);
    }

    #[test]
    fn nul_in_target_is_bad_request() {
        let error = parse_error(b"GET /a\x00b HTTP/1.1\r\n\r\n");
        assert!(matches!(error, ProtocolError::BadRequest { .. }));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        assert_eq!(parse_error(b"GET / HTTP/9.9\r\n\r\n"), ProtocolError::VersionNotSupported);
        assert_eq!(parse_error(b"GET / HTTP/1.2\r\n\r\n"), ProtocolError::VersionNotSupported);
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let error = parse_error(b"BREW /pot HTTP/1.1\r\n\r\n");
        assert_eq!(error, ProtocolError::not_implemented("BREW"));
    }

    #[test]
    fn overlong_target_is_uri_too_long() {
        let config = ParserConfig { uri_max: 16, ..ParserConfig::default() };
        let mut parser = RequestParser::new(config);
        let mut buf = BytesMut::from(&b"GET /aaaaaaaaaaaaaaaaaaaaaaaa HTTP/1.1\r\n\r\n"[..]);
        let error = parser.decode(&mut buf).unwrap_err();
        assert!(matches!(error, ParseError::Protocol(ProtocolError::UriTooLong { max: 16 })));
    }

    #[test]
    fn overlong_header_name_is_fields_too_large() {
        let name = "X".repeat(200);
        let input = format!("GET / HTTP/1.1\r\n{name}: v\r\n\r\n");
        let error = parse_error(input.as_bytes());
        assert!(matches!(error, ProtocolError::HeaderFieldsTooLarge { .. }));
    }

    #[test]
    fn too_many_headers_is_fields_too_large() {
        let config = ParserConfig { header_count_max: 4, ..ParserConfig::default() };
        let mut parser = RequestParser::new(config);
        let mut input = String::from("GET / HTTP/1.1\r\n");
        for i in 0..6 {
            input.push_str(&format!("X-H{i}: v\r\n"));
        }
        input.push_str("\r\n");
        let mut buf = BytesMut::from(input.as_bytes());
        let mut error = None;
        loop {
            match parser.decode(&mut buf) {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        assert!(matches!(
            error,
            Some(ParseError::Protocol(ProtocolError::HeaderFieldsTooLarge { .. }))
        ));
    }

    #[test]
    fn invalid_content_length_is_bad_request() {
        let error = parse_error(b"POST / HTTP/1.1\r\nContent-Length: -5\r\n\r\n");
        assert!(matches!(error, ProtocolError::BadRequest { .. }));
        let error = parse_error(b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert!(matches!(error, ProtocolError::BadRequest { .. }));
    }

    #[test]
    fn oversized_entity_is_rejected_up_front() {
        let config = ParserConfig { entity_max: 10, ..ParserConfig::default() };
        let mut parser = RequestParser::new(config);
        let mut buf = BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 11\r\n\r\n"[..]);
        let error = parser.decode(&mut buf).unwrap_err();
        assert!(matches!(
            error,
            ParseError::Protocol(ProtocolError::EntityTooLarge { size: 11, max: 10 })
        ));
    }

    #[test]
    fn oversized_chunked_entity_is_rejected() {
        let config = ParserConfig { entity_max: 8, ..ParserConfig::default() };
        let mut parser = RequestParser::new(config);
        let input = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n";
        let mut buf = BytesMut::from(&input[..]);
        let mut saw_error = false;
        loop {
            match parser.decode(&mut buf) {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(error) => {
                    assert!(matches!(
                        error,
                        ParseError::Protocol(ProtocolError::EntityTooLarge { .. })
                    ));
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn transfer_encoding_wins_over_content_length() {
        let mut parser = RequestParser::default();
        let input = b"POST / HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
        let mut events = events(&mut parser, input);
        let (_, kind) = events.remove(0).expect_head();
        assert_eq!(kind, BodyKind::Chunked);
    }

    #[test]
    fn identity_transfer_encoding_uses_content_length() {
        let mut parser = RequestParser::default();
        let input = b"POST / HTTP/1.1\r\nTransfer-Encoding: identity\r\nContent-Length: 3\r\n\r\nabc";
        let (_, body) = body_of(events(&mut parser, input));
        assert_eq!(body, b"abc");
    }

    #[test]
    fn failed_state_is_terminal_and_eats_input() {
        let mut parser = RequestParser::default();
        let mut buf = BytesMut::from(&b"GET / HTTP/9.9\r\n\r\n"[..]);
        assert!(parser.decode(&mut buf).is_err());
        assert!(buf.is_empty());

        buf.extend_from_slice(b"GET / HTTP/1.1\r\n\r\n");
        let error = parser.decode(&mut buf).unwrap_err();
        assert!(matches!(error, ParseError::Protocol(ProtocolError::VersionNotSupported)));
        assert!(buf.is_empty());
    }
}
