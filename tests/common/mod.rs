//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use reportline::auth::credential_store::{CredentialKey, CredentialStore, MemoryCredentialStore};
use reportline::auth::AuthManager;
use reportline::http::{HttpTransport, Transport};

/// Backend user record as the login endpoint returns it.
pub fn user_json() -> serde_json::Value {
    json!({
        "id": 42,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": "ada@example.com",
        "role": "reporter",
        "isVerified": true
    })
}

/// Transport pointing at a `wiremock` server.
pub fn make_transport(base_url: &str) -> Arc<dyn Transport> {
    Arc::new(
        HttpTransport::new(
            url::Url::parse(base_url).expect("valid url"),
            Duration::from_secs(5),
            true,
        )
        .expect("transport builds"),
    )
}

/// Manager over a fresh in-memory store.
pub fn make_manager(base_url: &str) -> (AuthManager, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let manager = AuthManager::new(make_transport(base_url), store.clone());
    (manager, store)
}

/// Manager whose session has been restored with the given credentials.
pub fn make_signed_in_manager(
    base_url: &str,
    access_token: &str,
    refresh_token: Option<&str>,
) -> (AuthManager, Arc<MemoryCredentialStore>) {
    let (manager, store) = make_manager(base_url);
    store
        .set(CredentialKey::AccessToken, access_token)
        .expect("store access token");
    if let Some(refresh) = refresh_token {
        store
            .set(CredentialKey::RefreshToken, refresh)
            .expect("store refresh token");
    }
    store
        .set(CredentialKey::UserProfile, &user_json().to_string())
        .expect("store user");
    manager.hydrate_from_store().expect("hydrate");
    (manager, store)
}
