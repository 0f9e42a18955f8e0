//! HTTP protocol version handling.

use std::fmt;

/// HTTP version of a request or response.
///
/// Only HTTP/1.0 and HTTP/1.1 are accepted on the wire; any other version
/// string is rejected during request-line parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/1.0
    Http10,
    /// HTTP/1.1
    Http11,
}

impl Version {
    /// Returns the wire representation, e.g. `"HTTP/1.1"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Whether connections default to keep-alive for this version.
    ///
    /// HTTP/1.1 defaults to persistent connections; HTTP/1.0 defaults to
    /// closing after one exchange. The `Connection` header overrides both.
    pub fn default_keep_alive(&self) -> bool {
        matches!(self, Version::Http11)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_representation() {
        assert_eq!(Version::Http10.as_str(), "HTTP/1.0");
        assert_eq!(Version::Http11.as_str(), "HTTP/1.1");
    }

    #[test]
    fn keep_alive_defaults() {
        assert!(!Version::Http10.default_keep_alive());
        assert!(Version::Http11.default_keep_alive());
    }
}
