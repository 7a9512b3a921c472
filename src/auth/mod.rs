//! Session authentication and transparent credential renewal
//!
//! Every request the client issues carries the current access token. When
//! the backend answers `401 Unauthorized`, exactly one renewal call is made no
//! matter how many requests failed concurrently, and each failed request is
//! retried once with the renewed token.
//!
//! # Module Layout
//!
//! - [`credential_store`] -- Persisted credentials (keyring, file, memory)
//! - [`session`]          -- In-memory session state with change notification
//! - [`service`]          -- Login, renewal and logout endpoints
//! - [`authenticator`]    -- Attaches the bearer token to outgoing requests
//! - [`coordinator`]      -- Single-flight renewal with FIFO waiters
//! - [`monitor`]          -- Turns `401` responses into renewal and retry
//! - [`manager`]          -- Facade wiring all of the above together

pub mod authenticator;
pub mod coordinator;
pub mod credential_store;
pub mod manager;
pub mod monitor;
pub mod service;
pub mod session;

pub use manager::AuthManager;
pub use session::{Session, SessionPhase, SessionState, UserProfile};
