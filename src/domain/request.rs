//! Requests and their outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// No outcome known yet
    None,
    /// Processed successfully
    Success,
    /// Processed, but failed
    Failure,
    /// Rejected because of invalid data (HTTP 400)
    Validation,
    /// Rejected because it was malformed
    Invalid,
    /// The requested resource does not exist (HTTP 404)
    NotFound,
    /// Rejected for security reasons
    Security,
    /// Authentication failed (HTTP 401)
    Authentication,
    /// Authorization failed (HTTP 403)
    Authorization,
}

impl Outcome {
    /// Classify an HTTP status code.
    ///
    /// A missing status or anything below 400 is a success, 5xx is a failure,
    /// and the client errors map to their closest category.
    pub fn from_http_status(status: Option<u16>) -> Outcome {
        match status {
            None => Outcome::Success,
            Some(code) if code < 400 => Outcome::Success,
            Some(code) if code >= 500 => Outcome::Failure,
            Some(405 | 406 | 415) => Outcome::Invalid,
            Some(400) => Outcome::Validation,
            Some(404) => Outcome::NotFound,
            Some(401) => Outcome::Authentication,
            Some(403) => Outcome::Authorization,
            Some(_) => Outcome::Failure,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::None => "NONE",
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
            Outcome::Validation => "VALIDATION",
            Outcome::Invalid => "INVALID",
            Outcome::NotFound => "NOT_FOUND",
            Outcome::Security => "SECURITY",
            Outcome::Authentication => "AUTHENTICATION",
            Outcome::Authorization => "AUTHORIZATION",
        };
        f.write_str(name)
    }
}

/// A request received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    uri: String,
    /// `uri` parsed once; `None` for relative or malformed URIs
    url: Option<Url>,
    address: String,
    outcome: Outcome,
}

impl Request {
    /// A successful request.
    pub fn new(uri: impl Into<String>, address: impl Into<String>) -> Self {
        Self::with(uri, address, Outcome::Success)
    }

    /// A request with a known outcome.
    pub fn with(uri: impl Into<String>, address: impl Into<String>, outcome: Outcome) -> Self {
        let uri = uri.into();
        Self {
            url: Url::parse(&uri).ok(),
            uri,
            address: address.into(),
            outcome,
        }
    }

    /// The requested URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Client address as received, an IP or a host name.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The outcome.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// A copy of this request with a different outcome.
    pub fn with_outcome(&self, outcome: Outcome) -> Request {
        Request {
            outcome,
            ..self.clone()
        }
    }

    /// Scheme of the URI in lower case, `"unknown"` when it has none.
    pub fn scheme(&self) -> &str {
        self.url.as_ref().map(Url::scheme).unwrap_or("unknown")
    }

    /// Host of the URI, `"unknown"` when it has none.
    ///
    /// Domain names are lower-cased and IPv6 hosts keep their brackets.
    pub fn host(&self) -> &str {
        self.url
            .as_ref()
            .and_then(Url::host_str)
            .unwrap_or("unknown")
    }
}

/// Identify the client behind a request.
///
/// Proxies append to `X-Forwarded-For`, so the first entry is the original
/// client. Without the header the socket's remote address is used.
pub fn first_client(forwarded_for: Option<&str>, remote_addr: &str) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|client| !client.is_empty())
        .unwrap_or(remote_addr)
        .to_string()
}
