//! Pure HTTP transport
//!
//! [`Transport`] issues one [`RequestDescriptor`] and returns the
//! [`HttpResponse`], whatever its status. It knows nothing about
//! credentials or retries: those are layered on top by
//! [`crate::http::client::ApiClient`].
//!
//! Failures are split into two transport-level classes:
//!
//! - [`ReportlineError::Timeout`] -- the configured per-request timeout
//!   elapsed.
//! - [`ReportlineError::Transport`] -- the connection could not be made or
//!   the body could not be read.
//!
//! An HTTP `401` is *not* a transport failure.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::{Result, ReportlineError};
use crate::http::request::{HttpResponse, RequestDescriptor};

/// Abstraction over the HTTP stack.
///
/// Implemented by [`HttpTransport`] for real traffic; tests substitute
/// in-process fakes through `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Sends `request` and returns the complete response.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Timeout`] or
    /// [`ReportlineError::Transport`]; never an HTTP-status error.
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport bound to one base URL.
///
/// Every request carries `Content-Type: application/json` and
/// `Accept: application/json`. When `include_credentials` is set the client
/// keeps a cookie store, so session cookies issued by the auth endpoints are
/// replayed on later calls (the refresh endpoint relies on this).
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use url::Url;
/// use reportline::http::transport::HttpTransport;
///
/// # fn example() -> reportline::error::Result<()> {
/// let transport = HttpTransport::new(
///     Url::parse("http://localhost:3000")?,
///     Duration::from_secs(20),
///     true,
/// )?;
/// assert_eq!(transport.endpoint("/incidents"), "http://localhost:3000/incidents");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Underlying reqwest HTTP client.
    http_client: reqwest::Client,
    /// Base URL without trailing slash.
    base_url: String,
    /// Per-request timeout.
    timeout: Duration,
}

impl HttpTransport {
    /// Constructs a transport targeting `base_url`.
    ///
    /// No network I/O is performed at construction time.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Http`] if the TLS backend cannot be
    /// initialised.
    pub fn new(base_url: url::Url, timeout: Duration, include_credentials: bool) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(include_credentials)
            .build()
            .map_err(ReportlineError::Http)?;

        Ok(Self {
            http_client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Constructs a transport from the `server` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Config`] for an invalid base URL.
    pub fn from_config(server: &ServerConfig) -> Result<Self> {
        Self::new(
            server.base_url()?,
            Duration::from_secs(server.timeout_seconds),
            server.include_credentials,
        )
    }

    /// Absolute URL for `path`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, error: reqwest::Error) -> ReportlineError {
        if error.is_timeout() {
            ReportlineError::Timeout(self.timeout.as_secs())
        } else {
            ReportlineError::Transport(error.to_string())
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse> {
        let url = self.endpoint(&request.path);
        let mut req = self
            .http_client
            .request(request.method.clone(), &url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");

        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        tracing::debug!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            "sending request"
        );

        let response = req.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        tracing::debug!(request_id = %request.id, status, "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
