//! Reportline - incident-reporting API client
//!
#![doc = "Reportline - incident-reporting API client"]
#![doc = "Main entry point for the reportline command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reportline::cli::{Cli, Commands};
use reportline::commands;
use reportline::config::{Config, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(&config.logging);
    if !std::path::Path::new(config_path).exists() {
        tracing::warn!("Config file not found at {}, using defaults", config_path);
    }

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Login { email, password } => {
            tracing::info!("Logging in as {}", email);
            commands::auth::login(&config, &email, &password).await?;
            Ok(())
        }
        Commands::Logout => {
            commands::auth::logout(&config).await?;
            Ok(())
        }
        Commands::Status { json } => {
            commands::auth::status(&config, json)?;
            Ok(())
        }
        Commands::Refresh => {
            tracing::info!("Forcing credential renewal");
            commands::auth::refresh(&config).await?;
            Ok(())
        }
        Commands::Request { method, path, body } => {
            tracing::debug!("Sending {} {}", method, path);
            commands::request::send(&config, &method, &path, body.as_deref()).await?;
            Ok(())
        }
        Commands::Incidents { command } => {
            commands::incidents::handle_incidents(&config, command).await?;
            Ok(())
        }
    }
}

/// Initialize tracing from the logging configuration
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr
/// so command output on stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("reportline={}", logging.level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
