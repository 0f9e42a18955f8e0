//! Wire codecs: the incremental request parser and response body framing.

pub(crate) mod body_encoder;
pub mod request_parser;

pub use request_parser::{ParserConfig, RequestParser};
