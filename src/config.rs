//! Configuration management for Reportline
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, ReportlineError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Reportline
///
/// This structure holds all configuration needed by the client: where the
/// backend lives, where credentials are persisted, and how to log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Credential persistence settings
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Scheme and host of the backend, optionally with a path prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Port appended to the base URL; `None` keeps the URL's own port
    #[serde(default = "default_port")]
    pub port: Option<u16>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Keep and replay cookies issued by the backend
    #[serde(default = "default_include_credentials")]
    pub include_credentials: bool,
}

fn default_base_url() -> String {
    "http://localhost".to_string()
}

fn default_port() -> Option<u16> {
    Some(3000)
}

fn default_timeout() -> u64 {
    20
}

fn default_include_credentials() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            include_credentials: default_include_credentials(),
        }
    }
}

impl ServerConfig {
    /// Resolves the effective base URL, applying `port` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::Config`] if `base_url` does not parse or
    /// cannot carry a port.
    ///
    /// # Examples
    ///
    /// ```
    /// use reportline::config::ServerConfig;
    ///
    /// let server = ServerConfig::default();
    /// assert_eq!(server.base_url().unwrap().as_str(), "http://localhost:3000/");
    /// ```
    pub fn base_url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.base_url).map_err(|e| {
            ReportlineError::Config(format!("Invalid base_url '{}': {}", self.base_url, e))
        })?;

        if let Some(port) = self.port {
            url.set_port(Some(port)).map_err(|_| {
                ReportlineError::Config(format!("base_url '{}' cannot have a port", self.base_url))
            })?;
        }

        Ok(url)
    }
}

/// Credential persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Storage backend: `keyring`, `file`, or `memory`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Keyring service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Credentials file for the `file` backend; defaults to the platform
    /// data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_backend() -> String {
    "file".to_string()
}

fn default_service_name() -> String {
    "reportline".to_string()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            service_name: default_service_name(),
            path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const VALID_BACKENDS: [&str; 3] = ["keyring", "file", "memory"];
const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// A missing file is not an error: defaults are used instead. Environment
    /// variables override the file, and CLI flags override both.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ReportlineError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ReportlineError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("REPORTLINE_BASE_URL") {
            self.server.base_url = base_url;
        }

        if let Ok(port) = std::env::var("REPORTLINE_PORT") {
            if port.is_empty() || port.eq_ignore_ascii_case("none") {
                self.server.port = None;
            } else if let Ok(value) = port.parse() {
                self.server.port = Some(value);
            } else {
                tracing::warn!("Invalid REPORTLINE_PORT: {}", port);
            }
        }

        if let Ok(timeout) = std::env::var("REPORTLINE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.server.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid REPORTLINE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(backend) = std::env::var("REPORTLINE_CREDENTIAL_BACKEND") {
            self.credentials.backend = backend.to_lowercase();
        }

        if let Ok(path) = std::env::var("REPORTLINE_CREDENTIAL_PATH") {
            self.credentials.path = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("REPORTLINE_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Ok(json) = std::env::var("REPORTLINE_JSON_LOGS") {
            match json.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.logging.json = true,
                "0" | "false" | "no" => self.logging.json = false,
                _ => tracing::warn!("Invalid REPORTLINE_JSON_LOGS: {}", json),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            self.server.base_url = base_url.clone();
            // An explicit URL carries its own port.
            self.server.port = None;
        }

        if let Some(backend) = &cli.credential_backend {
            self.credentials.backend = backend.to_lowercase();
        }

        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let url = self.server.base_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ReportlineError::Config(format!(
                "base_url must use http or https, got: {}",
                url.scheme()
            ))
            .into());
        }

        if self.server.timeout_seconds == 0 {
            return Err(
                ReportlineError::Config("timeout_seconds must be greater than 0".to_string()).into(),
            );
        }

        if !VALID_BACKENDS.contains(&self.credentials.backend.as_str()) {
            return Err(ReportlineError::Config(format!(
                "Invalid credential backend: {}. Must be one of: {}",
                self.credentials.backend,
                VALID_BACKENDS.join(", ")
            ))
            .into());
        }

        if self.credentials.backend == "keyring" && self.credentials.service_name.is_empty() {
            return Err(ReportlineError::Config(
                "credentials.service_name cannot be empty".to_string(),
            )
            .into());
        }

        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ReportlineError::Config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}
