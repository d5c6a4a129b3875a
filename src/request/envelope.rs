//! Response and failure envelopes exchanged across the callback boundary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// HTTP status treated as an authorization failure by the default classifier
pub const UNAUTHORIZED: u16 = 401;

/// Successful response envelope carrying the decoded body plus transport metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub body: T,
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Transport-supplied "next page" locator
    pub next_url: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a 200 response with no headers and no continuation
    pub fn new(body: T) -> Self {
        Self {
            body,
            status: 200,
            headers: HashMap::new(),
            next_url: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_next_url(mut self, next_url: Option<String>) -> Self {
        self.next_url = next_url;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Continuation token for the next page.
    ///
    /// Explicit `next_url` metadata wins; otherwise the `rel="next"` entry of a
    /// `Link` header is used. Blank values count as absent.
    pub fn continuation(&self) -> Option<String> {
        self.next_url
            .clone()
            .or_else(|| self.header("link").and_then(parse_next_link))
            .filter(|token| !token.trim().is_empty())
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            body: f(self.body),
            status: self.status,
            headers: self.headers,
            next_url: self.next_url,
        }
    }

    pub fn into_body(self) -> T {
        self.body
    }
}

/// Extract the `rel="next"` URL from an RFC 5988 `Link` header value
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param.eq_ignore_ascii_case("rel=\"next\"") || param.eq_ignore_ascii_case("rel=next")
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// Identifies the request that produced a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRef {
    pub method: String,
    pub url: String,
}

impl RequestRef {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for RequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Raw (undecoded) response attached to a failure
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Decode a structured error body, if there is one and it parses
    pub fn decode_body<E: DeserializeOwned>(&self) -> Option<E> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }
}

/// Failure delivered through `Callback::on_failure`
#[derive(Clone, Default)]
pub struct FailureEnvelope {
    pub request: Option<RequestRef>,
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    pub raw_response: Option<RawResponse>,
}

impl FailureEnvelope {
    /// Failure with a response attached (non-success status, malformed body)
    pub fn from_response(raw_response: RawResponse) -> Self {
        Self {
            raw_response: Some(raw_response),
            ..Self::default()
        }
    }

    /// Failure where no response was received at all
    pub fn from_cause(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            cause: Some(Arc::new(cause)),
            ..Self::default()
        }
    }

    pub fn with_request(mut self, request: RequestRef) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.raw_response.as_ref().map(|raw| raw.status)
    }
}

impl fmt::Debug for FailureEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureEnvelope")
            .field("request", &self.request)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .field("raw_response", &self.raw_response)
            .finish()
    }
}

impl fmt::Display for FailureEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request {
            Some(request) => write!(f, "{request}")?,
            None => write!(f, "request")?,
        }
        if let Some(status) = self.status() {
            write!(f, " -> status {status}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FailureEnvelope {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Failure classes derived from a `FailureEnvelope`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response was received
    Transport,
    /// 401-class response
    Authorization,
    /// Any other non-success or malformed response
    Api,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Authorization => write!(f, "authorization"),
            Self::Api => write!(f, "api"),
        }
    }
}

/// Policy hook deciding how a failure envelope is classified
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, envelope: &FailureEnvelope) -> FailureKind;
}

/// Status-table classifier; the default table only special-cases 401
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusClassifier {
    authorization_statuses: Vec<u16>,
}

impl StatusClassifier {
    pub fn new(authorization_statuses: Vec<u16>) -> Self {
        Self {
            authorization_statuses,
        }
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(vec![UNAUTHORIZED])
    }
}

impl FailureClassifier for StatusClassifier {
    fn classify(&self, envelope: &FailureEnvelope) -> FailureKind {
        match envelope.status() {
            None => FailureKind::Transport,
            Some(status) if self.authorization_statuses.contains(&status) => {
                FailureKind::Authorization
            }
            Some(_) => FailureKind::Api,
        }
    }
}
