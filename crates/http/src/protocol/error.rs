//! Error types for parsing, writing and serving requests.

use std::io;

use http::StatusCode;
use thiserror::Error;

/// A request the peer sent violated the protocol or exceeded a configured
/// limit.
///
/// The connection layer maps each variant to a synthesized error response via
/// [`ProtocolError::status`], then closes the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed request: {reason}")]
    BadRequest { reason: &'static str },

    #[error("request target exceeds {max} bytes")]
    UriTooLong { max: usize },

    #[error("header fields too large: {reason}")]
    HeaderFieldsTooLarge { reason: &'static str },

    #[error("request entity of {size} bytes exceeds the {max} byte limit")]
    EntityTooLarge { size: u64, max: u64 },

    #[error("http version not supported")]
    VersionNotSupported,

    #[error("method {method} not implemented")]
    NotImplemented { method: String },
}

impl ProtocolError {
    pub(crate) fn bad_request(reason: &'static str) -> Self {
        ProtocolError::BadRequest { reason }
    }

    pub(crate) fn fields_too_large(reason: &'static str) -> Self {
        ProtocolError::HeaderFieldsTooLarge { reason }
    }

    pub(crate) fn not_implemented(method: impl Into<String>) -> Self {
        ProtocolError::NotImplemented { method: method.into() }
    }

    /// The status code of the error response synthesized for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ProtocolError::UriTooLong { .. } => StatusCode::URI_TOO_LONG,
            ProtocolError::HeaderFieldsTooLarge { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            ProtocolError::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProtocolError::VersionNotSupported => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            ProtocolError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

/// Error produced while decoding the request stream.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Error observed by a handler while pulling body data.
///
/// `Aborted` means the transport failed or closed before the body completed;
/// it carries no protocol meaning and the connection is already gone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("connection aborted before the body completed")]
    Aborted,
}

/// Error produced while writing a response to the transport.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("failed to send response: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Top-level error for a connection's serve loop.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    Send {
        #[from]
        source: SendError,
    },
}
