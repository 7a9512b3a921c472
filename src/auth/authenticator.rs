//! Outbound credential attachment

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::credential_store::{CredentialKey, CredentialStore};
use crate::auth::service::REFRESH_PATH;
use crate::auth::session::Session;
use crate::http::request::RequestDescriptor;

/// Decorates outgoing requests with the current access token.
///
/// The token comes from the [`Session`]; when the session has none, the
/// [`CredentialStore`] is consulted and a stored token is republished into
/// the session (lazy hydration). Requests to the renewal endpoint are left
/// untouched. Authentication never fails: without a token the request is
/// simply sent unauthenticated.
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    session: Session,
    store: Arc<dyn CredentialStore>,
}

impl RequestAuthenticator {
    /// Creates an authenticator reading from `session`, falling back to
    /// `store`.
    pub fn new(session: Session, store: Arc<dyn CredentialStore>) -> Self {
        Self { session, store }
    }

    /// Attaches `Authorization: Bearer <token>` to `request`.
    ///
    /// Returns the token that was attached, if any.
    pub fn authenticate(&self, request: &mut RequestDescriptor) -> Option<String> {
        if request.targets(REFRESH_PATH) {
            return None;
        }

        let token = self.session.access_token().or_else(|| self.hydrate_token())?;
        Self::inject_token(&mut request.headers, &token);
        Some(token)
    }

    /// Inserts an `Authorization: Bearer <token>` header into the given map.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::HashMap;
    /// use reportline::auth::authenticator::RequestAuthenticator;
    ///
    /// let mut headers = HashMap::new();
    /// RequestAuthenticator::inject_token(&mut headers, "my_access_token");
    /// assert_eq!(
    ///     headers.get("Authorization"),
    ///     Some(&"Bearer my_access_token".to_string()),
    /// );
    /// ```
    pub fn inject_token(headers: &mut HashMap<String, String>, token: &str) {
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    }

    fn hydrate_token(&self) -> Option<String> {
        match self.store.get(CredentialKey::AccessToken) {
            Ok(Some(token)) => {
                tracing::debug!("hydrating access token from credential store");
                self.session.publish_token(token);
                self.session.access_token()
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("failed to read access token from credential store: {e}");
                None
            }
        }
    }
}
