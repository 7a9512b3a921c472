//! Session commands: `login`, `logout`, `status`, `refresh`

use colored::Colorize;
use serde::Serialize;

use crate::auth::session::{SessionPhase, SessionState, UserProfile};
use crate::config::Config;
use crate::error::Result;

/// Session summary printed by `status --json`.
///
/// Token values are never printed, only whether they are present.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport<'a> {
    pub authenticated: bool,
    pub phase: SessionPhase,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<&'a UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<&'a str>,
}

impl<'a> From<&'a SessionState> for StatusReport<'a> {
    fn from(state: &'a SessionState) -> Self {
        Self {
            authenticated: state.authenticated,
            phase: state.phase,
            has_access_token: state.access_token.is_some(),
            has_refresh_token: state.refresh_token.is_some(),
            user: state.user.as_ref(),
            last_error: state.last_error.as_deref(),
        }
    }
}

/// Sign in and persist the session
pub async fn login(config: &Config, email: &str, password: &str) -> Result<()> {
    let manager = super::connect(config)?;
    let user = manager.login(email, password).await?;
    println!(
        "{}",
        format!("Logged in as {}", user.display_name()).green()
    );
    Ok(())
}

/// Sign out and forget persisted credentials
pub async fn logout(config: &Config) -> Result<()> {
    let manager = super::connect(config)?;
    manager.logout().await?;
    println!("{}", "Logged out".green());
    Ok(())
}

/// Print the restored session
pub fn status(config: &Config, json: bool) -> Result<()> {
    let manager = super::connect(config)?;
    let state = manager.session();
    let report = StatusReport::from(&state);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in render_status(&report) {
        println!("{}", line);
    }
    Ok(())
}

/// Renew the access token now
pub async fn refresh(config: &Config) -> Result<()> {
    let manager = super::connect(config)?;
    manager.refresh().await?;
    println!("{}", "Access token renewed".green());
    Ok(())
}

fn render_status(report: &StatusReport<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    match (report.authenticated, report.user) {
        (true, Some(user)) => {
            lines.push(format!("{} {}", "Signed in as".green(), user.display_name().bold()));
            if let Some(email) = &user.email {
                lines.push(format!("  Email: {}", email));
            }
            if let Some(role) = &user.role {
                lines.push(format!("  Role:  {}", role));
            }
        }
        _ if report.has_access_token || report.has_refresh_token => {
            lines.push(format!(
                "{}",
                "Credentials found but no user profile; run `reportline refresh` or log in again"
                    .yellow()
            ));
        }
        _ => lines.push(format!("{}", "Not signed in".yellow())),
    }

    lines.push(format!("  Phase: {}", report.phase));
    if let Some(error) = report.last_error {
        lines.push(format!("  Last error: {}", error.red()));
    }
    lines
}
