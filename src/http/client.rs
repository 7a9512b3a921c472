//! Authenticating API client
//!
//! [`ApiClient`] is the pipeline every application request goes through:
//!
//! 1. [`RequestAuthenticator`] attaches the current access token.
//! 2. [`Transport`] sends the request.
//! 3. [`AuthorizationMonitor`] inspects the response and, on a renewable
//!    `401`, waits for the shared renewal and asks for a retry.
//!
//! Each logical request is retried at most once. Transport errors and
//! non-401 statuses pass through without touching the session.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::authenticator::RequestAuthenticator;
use crate::auth::monitor::{AuthorizationMonitor, Inspection};
use crate::error::Result;
use crate::http::request::{HttpResponse, PendingRequest, RequestDescriptor};
use crate::http::transport::Transport;

/// Client for authenticated calls to the backend API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    authenticator: RequestAuthenticator,
    monitor: AuthorizationMonitor,
}

impl ApiClient {
    /// Assembles the pipeline.
    pub fn new(
        transport: Arc<dyn Transport>,
        authenticator: RequestAuthenticator,
        monitor: AuthorizationMonitor,
    ) -> Self {
        Self {
            transport,
            authenticator,
            monitor,
        }
    }

    /// Sends `request`, renewing credentials and retrying once on `401`.
    ///
    /// Returns the response whatever its status (other than an unrecovered
    /// `401`).
    ///
    /// # Errors
    ///
    /// - Transport and timeout errors, unchanged.
    /// - [`ReportlineError::Renewal`](crate::error::ReportlineError::Renewal)
    ///   if renewal failed.
    /// - [`ReportlineError::Authorization`](crate::error::ReportlineError::Authorization)
    ///   if the request was rejected again after renewal.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<HttpResponse> {
        let mut pending = PendingRequest::new(request);

        loop {
            let mut outbound = pending.descriptor.clone();
            let sent_with = self.authenticator.authenticate(&mut outbound);
            let response = self.transport.send(&outbound).await?;

            match self
                .monitor
                .inspect(&mut pending, sent_with.as_deref(), response)
                .await?
            {
                Inspection::Deliver(response) => return Ok(response),
                Inspection::Retry => {
                    tracing::debug!(request_id = %pending.descriptor.id, "retrying with renewed credential");
                }
            }
        }
    }

    /// Sends `request` and decodes a 2xx JSON body.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus
    /// [`ReportlineError::Application`](crate::error::ReportlineError::Application)
    /// for other non-2xx statuses and a serialization error for bad JSON.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        self.execute(request).await?.error_for_status()?.json()
    }

    /// `GET path`, decoded as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute_json(RequestDescriptor::get(path)).await
    }

    /// `POST path` with a JSON body, decoded as JSON.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.execute_json(RequestDescriptor::post(path).with_json(body))
            .await
    }

    /// `PUT path` with a JSON body, decoded as JSON.
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.execute_json(RequestDescriptor::put(path).with_json(body))
            .await
    }

    /// `DELETE path`; any 2xx status is success.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(RequestDescriptor::delete(path))
            .await?
            .error_for_status()?;
        Ok(())
    }
}
