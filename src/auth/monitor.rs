//! Response-side authorization handling
//!
//! The [`AuthorizationMonitor`] looks at every response the client pipeline
//! receives. Anything other than `401` is delivered unchanged. A `401` from a
//! protected endpoint triggers one credential renewal through the
//! [`RefreshCoordinator`] and asks the pipeline to re-issue the request; a
//! second `401` for the same request is final.

use std::sync::Arc;

use crate::auth::coordinator::RefreshCoordinator;
use crate::auth::credential_store::CredentialStore;
use crate::auth::service::{LOGIN_PATH, REFRESH_PATH};
use crate::auth::session::Session;
use crate::error::{Result, ReportlineError};
use crate::http::request::{HttpResponse, PendingRequest};

/// What the client pipeline should do with a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Inspection {
    /// Hand the response to the caller.
    Deliver(HttpResponse),
    /// Credentials were renewed; re-issue the request.
    Retry,
}

/// Intercepts `401 Unauthorized` responses.
#[derive(Debug, Clone)]
pub struct AuthorizationMonitor {
    session: Session,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
}

impl AuthorizationMonitor {
    /// Creates a monitor renewing through `coordinator`.
    pub fn new(
        session: Session,
        store: Arc<dyn CredentialStore>,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            session,
            store,
            coordinator,
        }
    }

    /// Decides the fate of `response`, received for `request` sent with the
    /// access token `sent_with`.
    ///
    /// On a renewable `401` this marks `request` as retried and waits for the
    /// (possibly shared) renewal to finish before returning
    /// [`Inspection::Retry`].
    ///
    /// # Errors
    ///
    /// - [`ReportlineError::Authorization`] when the `401` came from the login
    ///   or renewal endpoint, or when the request was already retried once.
    /// - [`ReportlineError::Renewal`] when renewal failed.
    pub async fn inspect(
        &self,
        request: &mut PendingRequest,
        sent_with: Option<&str>,
        response: HttpResponse,
    ) -> Result<Inspection> {
        if !response.is_unauthorized() {
            return Ok(Inspection::Deliver(response));
        }

        let path = request.descriptor.path.clone();

        if request.descriptor.targets(LOGIN_PATH) || request.descriptor.targets(REFRESH_PATH) {
            tracing::warn!(request_id = %request.descriptor.id, %path, "auth endpoint rejected the request");
            self.session.clear(Some("authorization rejected"));
            if let Err(e) = self.store.clear() {
                tracing::warn!("failed to clear persisted credentials: {e}");
            }
            return Err(Self::rejected(path, response));
        }

        if request.retry_attempted {
            tracing::warn!(request_id = %request.descriptor.id, %path, "request rejected again after renewal");
            return Err(Self::rejected(path, response));
        }

        request.retry_attempted = true;
        tracing::debug!(request_id = %request.descriptor.id, %path, "unauthorized; renewing credential");
        self.coordinator.renew_stale(sent_with).await?;
        Ok(Inspection::Retry)
    }

    fn rejected(path: String, response: HttpResponse) -> anyhow::Error {
        ReportlineError::Authorization {
            path,
            message: response.body,
        }
        .into()
    }
}
