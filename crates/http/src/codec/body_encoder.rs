//! Response body framing.

use bytes::BytesMut;
use tracing::warn;

/// Applies wire framing to outgoing body bytes.
///
/// The framing is chosen once, when the response head is flushed, and stays
/// fixed for the rest of the response.
#[derive(Debug)]
pub(crate) enum BodyEncoder {
    /// `Transfer-Encoding: chunked`. Each write becomes one chunk.
    Chunked { in_trailers: bool },
    /// A counted body; writes beyond the declared length are dropped.
    Length { remaining: u64 },
    /// No framing. The end of the body is signalled by closing the
    /// connection.
    CloseDelimited,
}

impl BodyEncoder {
    pub(crate) fn chunked() -> Self {
        BodyEncoder::Chunked { in_trailers: false }
    }

    pub(crate) fn length(remaining: u64) -> Self {
        BodyEncoder::Length { remaining }
    }

    /// Whether the connection must close to delimit this body.
    pub(crate) fn forces_close(&self) -> bool {
        matches!(self, BodyEncoder::CloseDelimited)
    }

    pub(crate) fn encode_data(&mut self, data: &[u8], dst: &mut BytesMut) {
        match self {
            BodyEncoder::Chunked { in_trailers } => {
                // An empty chunk would read as the last-chunk marker.
                if data.is_empty() || *in_trailers {
                    return;
                }
                dst.extend_from_slice(format!("{:X}\r\n", data.len()).as_bytes());
                dst.extend_from_slice(data);
                dst.extend_from_slice(b"\r\n");
            }
            BodyEncoder::Length { remaining } => {
                let take = (*remaining).min(data.len() as u64) as usize;
                if take < data.len() {
                    warn!(
                        dropped = data.len() - take,
                        "body write exceeds declared content-length"
                    );
                }
                dst.extend_from_slice(&data[..take]);
                *remaining -= take as u64;
            }
            BodyEncoder::CloseDelimited => dst.extend_from_slice(data),
        }
    }

    /// Emits the last-chunk marker, opening the trailer section. Only
    /// meaningful for chunked framing; trailer lines follow verbatim.
    pub(crate) fn begin_trailers(&mut self, dst: &mut BytesMut) {
        if let BodyEncoder::Chunked { in_trailers } = self {
            if !*in_trailers {
                dst.extend_from_slice(b"0\r\n");
                *in_trailers = true;
            }
        }
    }

    /// Terminates the body framing.
    pub(crate) fn finish(&mut self, dst: &mut BytesMut) {
        match self {
            BodyEncoder::Chunked { in_trailers: false } => dst.extend_from_slice(b"0\r\n\r\n"),
            BodyEncoder::Chunked { in_trailers: true } => dst.extend_from_slice(b"\r\n"),
            BodyEncoder::Length { remaining } => {
                if *remaining > 0 {
                    warn!(missing = *remaining, "response body shorter than declared content-length");
                }
            }
            BodyEncoder::CloseDelimited => {}
        }
    }
}
