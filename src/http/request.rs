//! Request and response values exchanged with the transport
//!
//! A [`RequestDescriptor`] is everything needed to (re)issue a call: it is
//! cloned for every dispatch so that a retried request is byte-for-byte the
//! same call with fresh credentials. The retry bookkeeping lives in
//! [`PendingRequest`], which the client pipeline owns; caller-owned
//! descriptors are never mutated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::error::{Result, ReportlineError};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a logical request.
///
/// A retried request keeps its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// An outbound API call, relative to the configured base URL.
///
/// # Examples
///
/// ```
/// use reportline::http::request::RequestDescriptor;
///
/// let request = RequestDescriptor::post("/incidents")
///     .with_json(serde_json::json!({"title": "Pothole"}))
///     .with_header("X-Client", "cli");
/// assert!(request.targets("/incidents"));
/// assert_eq!(request.headers.get("X-Client").map(String::as_str), Some("cli"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Identifier shared by every dispatch of this request.
    pub id: RequestId,
    /// HTTP method.
    pub method: Method,
    /// Path (and optional query) beginning with `/`.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
    /// Extra headers. `Authorization` is managed by the client.
    pub headers: HashMap<String, String>,
}

impl RequestDescriptor {
    /// Creates a descriptor with a fresh [`RequestId`].
    ///
    /// A missing leading `/` is added.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            id: RequestId::next(),
            method,
            path,
            body: None,
            headers: HashMap::new(),
        }
    }

    /// `GET path`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `DELETE path`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attaches a JSON body.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns `true` when the path, ignoring any query string, is `endpoint`.
    pub fn targets(&self, endpoint: &str) -> bool {
        let path = self.path.split('?').next().unwrap_or_default();
        path.trim_end_matches('/') == endpoint.trim_end_matches('/')
    }
}

/// A request as tracked by the client pipeline.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// The call to (re)issue.
    pub descriptor: RequestDescriptor,
    /// Set once the request has been retried after an authorization failure.
    pub retry_attempted: bool,
}

impl PendingRequest {
    /// Wraps a descriptor that has not been retried yet.
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self {
            descriptor,
            retry_attempted: false,
        }
    }
}

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers with lower-cased names.
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: String,
}

impl HttpResponse {
    /// Builds a response with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `true` for `401 Unauthorized`.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Converts a non-2xx response into [`ReportlineError::Application`].
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Application`] carrying the status and body.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ReportlineError::Application {
                status: self.status,
                body: self.body,
            }
            .into())
        }
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Serialization`] if the body is not valid
    /// JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| ReportlineError::Serialization(e).into())
    }
}
