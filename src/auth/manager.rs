//! Authentication facade
//!
//! [`AuthManager`] wires the session, the credential store, the remote auth
//! service, the refresh coordinator and the API client together, and is the
//! only type a front end (the CLI, or any UI) needs to hold:
//!
//! - [`AuthManager::login`] / [`AuthManager::logout`] -- explicit session
//!   lifecycle.
//! - [`AuthManager::hydrate_from_store`] -- restore persisted credentials at
//!   startup.
//! - [`AuthManager::session`] / [`AuthManager::subscribe`] -- observe state.
//! - [`AuthManager::client`] -- authenticated API calls with transparent
//!   renewal.
//!
//! # Examples
//!
//! ```no_run
//! use reportline::auth::manager::AuthManager;
//! use reportline::config::Config;
//!
//! # async fn example() -> reportline::error::Result<()> {
//! let manager = AuthManager::from_config(&Config::default())?;
//! manager.hydrate_from_store()?;
//! if !manager.session().authenticated {
//!     manager.login("ada@example.com", "hunter2").await?;
//! }
//! let incidents: serde_json::Value = manager.client().get_json("/incidents").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::authenticator::RequestAuthenticator;
use crate::auth::coordinator::RefreshCoordinator;
use crate::auth::credential_store::{open_store, CredentialKey, CredentialStore};
use crate::auth::monitor::AuthorizationMonitor;
use crate::auth::service::{AuthService, HttpAuthService};
use crate::auth::session::{Session, SessionState, UserProfile};
use crate::config::Config;
use crate::error::Result;
use crate::http::client::ApiClient;
use crate::http::transport::{HttpTransport, Transport};

// ---------------------------------------------------------------------------
// AuthManager
// ---------------------------------------------------------------------------

/// Owner of the authentication stack.
///
/// Must be constructed inside a Tokio runtime: construction spawns the
/// [`RefreshCoordinator`] task.
#[derive(Debug, Clone)]
pub struct AuthManager {
    session: Session,
    store: Arc<dyn CredentialStore>,
    service: Arc<dyn AuthService>,
    coordinator: RefreshCoordinator,
    client: ApiClient,
}

impl AuthManager {
    /// Builds the stack from configuration: an [`HttpTransport`] for the
    /// `server` section and the credential backend from `credentials`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid base URL or credential
    /// backend.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(&config.server)?);
        let store = open_store(&config.credentials)?;
        Ok(Self::new(transport, store))
    }

    /// Builds the stack over `transport`, talking to the backend's auth
    /// endpoints through the same transport.
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn CredentialStore>) -> Self {
        let service = Arc::new(HttpAuthService::new(Arc::clone(&transport)));
        Self::with_auth_service(transport, service, store)
    }

    /// Builds the stack with an explicit [`AuthService`].
    pub fn with_auth_service(
        transport: Arc<dyn Transport>,
        service: Arc<dyn AuthService>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let session = Session::new();
        let coordinator =
            RefreshCoordinator::spawn(session.clone(), Arc::clone(&service), Arc::clone(&store));
        let client = ApiClient::new(
            transport,
            RequestAuthenticator::new(session.clone(), Arc::clone(&store)),
            AuthorizationMonitor::new(session.clone(), Arc::clone(&store), coordinator.clone()),
        );

        Self {
            session,
            store,
            service,
            coordinator,
            client,
        }
    }

    /// Signs in with email and password.
    ///
    /// On success the session becomes authenticated and the credentials are
    /// persisted. On failure the session records the error and any persisted
    /// credentials are removed.
    ///
    /// # Errors
    ///
    /// Returns the login error: `Authorization` for rejected credentials,
    /// `Application` for other statuses, or a transport error.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        self.session.begin_authentication();

        let response = match self.service.login(email, password).await {
            Ok(response) => response,
            Err(e) => {
                self.session.fail_authentication(&e.to_string());
                self.coordinator.session_changed();
                if let Err(clear_err) = self.store.clear() {
                    tracing::warn!("failed to clear persisted credentials: {clear_err}");
                }
                return Err(e);
            }
        };

        self.session.complete_login(
            response.token.clone(),
            response.refresh_token.clone(),
            response.user.clone(),
        );
        self.coordinator.session_changed();
        self.persist(&response.token, response.refresh_token.as_deref(), &response.user);

        tracing::info!(user = %response.user.display_name(), "logged in");
        Ok(response.user)
    }

    /// Signs out.
    ///
    /// The backend is asked to invalidate the session, but a failure to
    /// reach it does not prevent the local sign-out.
    ///
    /// # Errors
    ///
    /// Returns an error only when persisted credentials cannot be removed;
    /// the in-memory session is cleared regardless.
    pub async fn logout(&self) -> Result<()> {
        let token = self.session.access_token();
        if let Err(e) = self.service.logout(token.as_deref()).await {
            tracing::warn!("backend logout failed: {e}");
        }

        self.session.clear(None);
        self.coordinator.session_changed();
        self.store.clear()?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Forces a credential renewal, joining one already in flight.
    ///
    /// # Errors
    ///
    /// Returns `Renewal` when no refresh token is available or the backend
    /// rejects it; the session is cleared in both cases.
    pub async fn refresh(&self) -> Result<String> {
        self.coordinator.ensure_valid_credential().await
    }

    /// Loads persisted credentials into the session.
    ///
    /// A stored profile that no longer parses is ignored.
    ///
    /// # Errors
    ///
    /// Returns the credential store's error if it cannot be read.
    pub fn hydrate_from_store(&self) -> Result<SessionState> {
        let access_token = self.store.get(CredentialKey::AccessToken)?;
        let refresh_token = self.store.get(CredentialKey::RefreshToken)?;
        let user = match self.store.get(CredentialKey::UserProfile)? {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!("ignoring unreadable stored user profile: {e}");
                    None
                }
            },
            None => None,
        };

        self.session.hydrate(access_token, refresh_token, user);
        self.coordinator.session_changed();
        Ok(self.session.snapshot())
    }

    /// Current session snapshot.
    pub fn session(&self) -> SessionState {
        self.session.snapshot()
    }

    /// Shared session handle.
    pub fn session_handle(&self) -> &Session {
        &self.session
    }

    /// Receiver notified on every session transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Authenticated API client.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Refresh coordinator shared with the client.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    fn persist(&self, access_token: &str, refresh_token: Option<&str>, user: &UserProfile) {
        let mut writes = vec![(CredentialKey::AccessToken, access_token.to_string())];
        if let Some(refresh) = refresh_token {
            writes.push((CredentialKey::RefreshToken, refresh.to_string()));
        }
        match serde_json::to_string(user) {
            Ok(json) => writes.push((CredentialKey::UserProfile, json)),
            Err(e) => tracing::warn!("failed to serialize user profile: {e}"),
        }

        for (key, value) in writes {
            if let Err(e) = self.store.set(key, &value) {
                tracing::warn!(%key, "failed to persist credential: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
