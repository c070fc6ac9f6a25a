//! HTTP methods a route can be registered for.
//!
//! Requests may arrive with any method (CORS preflights use `OPTIONS`, for
//! instance); only these six can own a route.

use std::fmt;
use std::str::FromStr;

/// A routable HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Delete,
    Get,
    Head,
    Patch,
    Post,
    Put,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get    => "GET",
            Self::Head   => "HEAD",
            Self::Patch  => "PATCH",
            Self::Post   => "POST",
            Self::Put    => "PUT",
        }
    }

    /// Exact comparison against a request method.
    pub fn matches(self, method: &http::Method) -> bool {
        self.as_str() == method.as_str()
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DELETE" => Ok(Self::Delete),
            "GET"    => Ok(Self::Get),
            "HEAD"   => Ok(Self::Head),
            "PATCH"  => Ok(Self::Patch),
            "POST"   => Ok(Self::Post),
            "PUT"    => Ok(Self::Put),
            _        => Err(()),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
