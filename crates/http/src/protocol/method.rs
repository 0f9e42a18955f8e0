//! HTTP request methods.

use std::fmt;
use std::str::FromStr;

use crate::protocol::error::ProtocolError;

/// HTTP request method.
///
/// Only the methods listed here are dispatched; a syntactically valid but
/// unrecognized method token is rejected with [`ProtocolError::NotImplemented`]
/// during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Returns the wire representation, e.g. `"GET"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ProtocolError::not_implemented(token)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_methods_parse() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let err = "BREW".parse::<Method>().unwrap_err();
        assert!(matches!(err, ProtocolError::NotImplemented { .. }));
    }

    #[test]
    fn methods_outside_the_allow_list_are_rejected() {
        for token in ["OPTIONS", "TRACE", "CONNECT", "PATCH"] {
            assert!(token.parse::<Method>().is_err(), "{token} should not parse");
        }
    }

    #[test]
    fn methods_are_case_sensitive() {
        assert!("get".parse::<Method>().is_err());
    }
}
