//! Reportline - incident-reporting API client library
//!
//! This library provides an authenticated HTTP client for an
//! incident-reporting backend. Every request carries the current access
//! token; when the backend rejects an expired token, the client renews it
//! exactly once (however many requests failed at the same time) and retries
//! each rejected request once.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Session state, credential persistence, single-flight renewal
//! - `http`: Request values, the transport, and the authenticating client
//! - `api`: Typed incident endpoints
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use reportline::{AuthManager, Config};
//! use reportline::api::IncidentApi;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let manager = AuthManager::from_config(&config)?;
//!     manager.hydrate_from_store()?;
//!     let incidents = IncidentApi::new(manager.client().clone()).list().await?;
//!     println!("{} incidents", incidents.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;

// Re-export commonly used types
pub use auth::{AuthManager, Session, SessionState};
pub use config::Config;
pub use error::{Result, ReportlineError};
pub use http::ApiClient;
