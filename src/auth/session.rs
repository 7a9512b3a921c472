//! In-memory authentication session
//!
//! A [`Session`] is the single source of truth for the current credentials
//! while the process runs. It is an explicitly constructed, cloneable handle
//! (clones share the same state) rather than a global, so tests can build
//! isolated instances.
//!
//! The state lives in a `tokio::sync::watch` channel. Every transition is a
//! single `send_modify` call, which makes it atomic with respect to readers
//! and lets UI observers [`subscribe`](Session::subscribe) to changes of the
//! `authenticated`, `pending_operation` and `last_error` fields.
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated -> Refreshing
//!        ^                 |                 |              |
//!        +-----------------+-----------------+--------------+
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// Identifier of a backend record (user, incident).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric database identifier.
    Numeric(i64),
    /// Opaque string identifier (UUID, ULID, ...).
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// Identity record returned by the login endpoint.
///
/// The client never interprets this record; it is stored and handed back to
/// the UI unchanged. Unknown fields are preserved in `extra`.
///
/// # Examples
///
/// ```
/// use reportline::auth::session::UserProfile;
///
/// let json = r#"{"id": 7, "firstName": "Ada", "role": "reporter", "isVerified": true}"#;
/// let user: UserProfile = serde_json::from_str(json).unwrap();
/// assert_eq!(user.id.to_string(), "7");
/// assert!(user.is_verified);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Backend user identifier.
    pub id: RecordId,

    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Role name (e.g. `reporter`, `admin`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Whether the account has been verified.
    #[serde(default)]
    pub is_verified: bool,

    /// Account creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Any further fields sent by the backend.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl UserProfile {
    /// Human-readable name, falling back to the email or the id.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self
                .email
                .clone()
                .unwrap_or_else(|| self.id.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Coarse lifecycle phase of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No usable credentials.
    #[default]
    Unauthenticated,
    /// A login is in progress.
    Authenticating,
    /// Access token and user are both known.
    Authenticated,
    /// A credential renewal is in flight.
    Refreshing,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
        };
        f.write_str(name)
    }
}

/// Snapshot of the authentication session.
///
/// `authenticated` is never written directly; it is derived from
/// `access_token` and `user` at the end of every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Current access token.
    pub access_token: Option<String>,
    /// Current refresh token.
    pub refresh_token: Option<String>,
    /// Signed-in user.
    pub user: Option<UserProfile>,
    /// `true` iff both `access_token` and `user` are present.
    pub authenticated: bool,
    /// `true` while a login or renewal is in progress.
    pub pending_operation: bool,
    /// Message of the last failed operation, for display.
    pub last_error: Option<String>,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Bumped whenever the session is replaced or reset (login, logout,
    /// hydration). A renewal started under one generation must not install
    /// its result into another.
    pub generation: u64,
}

impl SessionState {
    /// Returns `true` when the derived fields agree with the credentials.
    pub fn is_consistent(&self) -> bool {
        self.authenticated == (self.access_token.is_some() && self.user.is_some())
    }

    fn settle(&mut self) {
        self.authenticated = self.access_token.is_some() && self.user.is_some();
        if !self.pending_operation {
            self.phase = if self.authenticated {
                SessionPhase::Authenticated
            } else {
                SessionPhase::Unauthenticated
            };
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Shared handle to the authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates an empty, unauthenticated session.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified after every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    /// Current refresh token, if any.
    pub fn refresh_token(&self) -> Option<String> {
        self.state.borrow().refresh_token.clone()
    }

    /// Whether the session holds both an access token and a user.
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().authenticated
    }

    /// Whether a login or renewal is in progress.
    pub fn is_pending(&self) -> bool {
        self.state.borrow().pending_operation
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Marks the start of a login.
    pub fn begin_authentication(&self) {
        self.state.send_modify(|s| {
            s.pending_operation = true;
            s.last_error = None;
            s.phase = SessionPhase::Authenticating;
            s.generation += 1;
        });
        tracing::debug!("session: authenticating");
    }

    /// Installs the credentials returned by a successful login.
    pub fn complete_login(&self, access_token: String, refresh_token: Option<String>, user: UserProfile) {
        self.state.send_modify(|s| {
            s.access_token = Some(access_token);
            s.refresh_token = refresh_token;
            s.user = Some(user);
            s.pending_operation = false;
            s.last_error = None;
            s.generation += 1;
            s.settle();
        });
        tracing::info!("session: authenticated");
    }

    /// Records a failed login and drops any credentials.
    pub fn fail_authentication(&self, error: &str) {
        self.state.send_modify(|s| {
            *s = SessionState {
                last_error: Some(error.to_string()),
                generation: s.generation + 1,
                ..SessionState::default()
            };
        });
        tracing::info!(error, "session: authentication failed");
    }

    /// Marks the start of a credential renewal and returns the generation
    /// the renewal belongs to.
    pub fn begin_refresh(&self) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.pending_operation = true;
            s.phase = SessionPhase::Refreshing;
            generation = s.generation;
        });
        tracing::debug!(generation, "session: refreshing");
        generation
    }

    /// Installs a renewed access token, unless the session has moved past
    /// `generation` since the renewal began.
    ///
    /// The refresh token is replaced only when the backend rotated it;
    /// otherwise the previous one is kept. `user` fills in the profile when
    /// the session does not already hold one. Returns `false`, leaving the
    /// session untouched, when the renewal is stale.
    pub fn complete_refresh(
        &self,
        generation: u64,
        access_token: String,
        rotated_refresh_token: Option<String>,
        user: Option<UserProfile>,
    ) -> bool {
        let installed = self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            s.access_token = Some(access_token);
            if let Some(refresh) = rotated_refresh_token {
                s.refresh_token = Some(refresh);
            }
            if s.user.is_none() {
                s.user = user;
            }
            s.pending_operation = false;
            s.last_error = None;
            s.settle();
            true
        });
        if installed {
            tracing::info!("session: credential renewed");
        } else {
            tracing::debug!(generation, "session: discarded stale renewal");
        }
        installed
    }

    /// Clears the session after a failed renewal, unless the session has
    /// moved past `generation` since the renewal began.
    ///
    /// Returns `false`, leaving the session untouched, when the renewal is
    /// stale.
    pub fn expire(&self, generation: u64, reason: &str) -> bool {
        let expired = self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            *s = SessionState {
                last_error: Some(reason.to_string()),
                generation: s.generation + 1,
                ..SessionState::default()
            };
            true
        });
        if expired {
            tracing::info!(reason, "session: expired");
        }
        expired
    }

    /// Publishes a token found in the credential store when the session had
    /// none. An existing token is never overwritten.
    pub fn publish_token(&self, access_token: String) {
        self.state.send_modify(|s| {
            if s.access_token.is_none() {
                s.access_token = Some(access_token);
                s.settle();
            }
        });
    }

    /// Loads persisted credentials at startup.
    pub fn hydrate(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
        user: Option<UserProfile>,
    ) {
        self.state.send_modify(|s| {
            s.access_token = access_token;
            s.refresh_token = refresh_token;
            s.user = user;
            s.pending_operation = false;
            s.generation += 1;
            s.settle();
        });
        tracing::debug!(authenticated = self.is_authenticated(), "session: hydrated");
    }

    /// Resets the session to empty, keeping `reason` as the last error.
    pub fn clear(&self, reason: Option<&str>) {
        self.state.send_modify(|s| {
            *s = SessionState {
                last_error: reason.map(str::to_string),
                generation: s.generation + 1,
                ..SessionState::default()
            };
        });
        tracing::info!(reason = reason.unwrap_or("logout"), "session: cleared");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
