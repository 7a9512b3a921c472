//! Remote authentication endpoints
//!
//! [`AuthService`] is the client-side view of the backend's three auth
//! endpoints. [`HttpAuthService`] talks to them over the raw
//! [`Transport`], bypassing the authenticating client pipeline: the auth
//! endpoints must never trigger a credential renewal themselves.
//!
//! | Operation | Endpoint | Body | Response |
//! |-----------|----------|------|----------|
//! | login     | `POST /auth/login`   | `{email, password}` | `{token, refreshToken?, user}` |
//! | refresh   | `POST /auth/refresh` | `{refreshToken}` + session cookie | `{token, refreshToken?}` |
//! | logout    | `POST /auth/logout`  | none, bearer token | `{success}` |

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::authenticator::RequestAuthenticator;
use crate::auth::session::UserProfile;
use crate::error::{Result, ReportlineError};
use crate::http::request::{HttpResponse, RequestDescriptor};
use crate::http::transport::Transport;

/// Login endpoint path.
pub const LOGIN_PATH: &str = "/auth/login";
/// Credential renewal endpoint path.
pub const REFRESH_PATH: &str = "/auth/refresh";
/// Logout endpoint path.
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Successful login payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// New access token.
    pub token: String,
    /// New refresh token, when the backend issues one in the body.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Signed-in user.
    pub user: UserProfile,
}

/// Successful renewal payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// Renewed access token.
    pub token: String,
    /// Rotated refresh token; absent when the backend did not rotate it.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Logout acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LogoutResponse {
    /// Whether the backend invalidated the session.
    #[serde(default)]
    pub success: bool,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// The backend's authentication operations.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync + std::fmt::Debug {
    /// Exchanges email and password for credentials.
    ///
    /// # Errors
    ///
    /// [`ReportlineError::Authorization`] for rejected credentials,
    /// [`ReportlineError::Application`] for other statuses, or a transport
    /// error.
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse>;

    /// Exchanges a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`ReportlineError::Renewal`].
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse>;

    /// Invalidates the session on the backend.
    ///
    /// # Errors
    ///
    /// [`ReportlineError::Application`] for non-2xx statuses, or a
    /// transport error.
    async fn logout(&self, access_token: Option<&str>) -> Result<LogoutResponse>;
}

/// [`AuthService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthService {
    transport: Arc<dyn Transport>,
}

impl HttpAuthService {
    /// Creates a service that sends through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn post(&self, request: RequestDescriptor) -> Result<HttpResponse> {
        self.transport.send(&request).await
    }
}

#[async_trait::async_trait]
impl AuthService for HttpAuthService {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = serde_json::to_value(LoginBody { email, password })?;
        let response = self
            .post(RequestDescriptor::post(LOGIN_PATH).with_json(body))
            .await?;

        if response.is_unauthorized() {
            return Err(ReportlineError::Authorization {
                path: LOGIN_PATH.to_string(),
                message: response.body,
            }
            .into());
        }

        response.error_for_status()?.json()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let body = serde_json::to_value(RefreshBody { refresh_token })?;
        let response = self
            .post(RequestDescriptor::post(REFRESH_PATH).with_json(body))
            .await
            .map_err(|e| ReportlineError::Renewal(format!("refresh request failed: {e}")))?;

        if !response.is_success() {
            return Err(ReportlineError::Renewal(format!(
                "refresh endpoint returned {}: {}",
                response.status, response.body
            ))
            .into());
        }

        let parsed = response.json::<RefreshResponse>().map_err(|e| {
            ReportlineError::Renewal(format!("failed to parse refresh response: {e}"))
        })?;
        Ok(parsed)
    }

    async fn logout(&self, access_token: Option<&str>) -> Result<LogoutResponse> {
        let mut request = RequestDescriptor::post(LOGOUT_PATH);
        if let Some(token) = access_token {
            RequestAuthenticator::inject_token(&mut request.headers, token);
        }

        let response = self.post(request).await?.error_for_status()?;
        if response.body.trim().is_empty() {
            return Ok(LogoutResponse { success: true });
        }
        response.json()
    }
}
