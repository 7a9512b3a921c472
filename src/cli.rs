//! Command-line interface definition for Reportline
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for session management, raw API requests, and
//! incident reports.

use clap::{Parser, Subcommand};

/// Reportline - incident-reporting API client
///
/// Signs in to the incident-reporting backend, keeps the session alive by
/// renewing expired credentials transparently, and issues API requests.
#[derive(Parser, Debug, Clone)]
#[command(name = "reportline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the backend base URL from config
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Override the credential backend from config (keyring, file, memory)
    #[arg(long, global = true)]
    pub credential_backend: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Reportline
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and persist the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "REPORTLINE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget persisted credentials
    Logout,

    /// Show the current session
    Status {
        /// Print the session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Renew the access token now
    Refresh,

    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...)
        method: String,

        /// Path relative to the base URL, e.g. /incidents
        path: String,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Manage incident reports
    Incidents {
        /// Incident subcommand
        #[command(subcommand)]
        command: IncidentCommand,
    },
}

/// Incident subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum IncidentCommand {
    /// List incident reports
    List {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one incident report
    Show {
        /// Incident identifier
        id: String,
    },

    /// File a new incident report
    Create {
        /// Short title
        #[arg(long)]
        title: String,

        /// Detailed description
        #[arg(long)]
        description: String,

        /// Category, e.g. pothole or streetlight
        #[arg(long)]
        category: String,

        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,

        /// Street address
        #[arg(long)]
        address: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            base_url: None,
            credential_backend: None,
            command: Commands::Status { json: false },
        }
    }
}
