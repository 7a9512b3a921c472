/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `auth`      — login, logout, status, and forced renewal
- `request`   — raw authenticated requests
- `incidents` — incident report listing, lookup, and filing

Every handler builds an [`AuthManager`] from configuration and restores the
persisted session before doing anything else.
*/

use crate::auth::AuthManager;
use crate::config::Config;
use crate::error::Result;

pub mod auth;
pub mod incidents;
pub mod request;

/// Builds the authentication stack and restores the persisted session.
///
/// # Errors
///
/// Returns error if the configuration is unusable or the credential store
/// cannot be read
pub fn connect(config: &Config) -> Result<AuthManager> {
    let manager = AuthManager::from_config(config)?;
    let state = manager.hydrate_from_store()?;
    tracing::debug!(
        authenticated = state.authenticated,
        has_refresh_token = state.refresh_token.is_some(),
        "restored session"
    );
    Ok(manager)
}
