//! Raw authenticated request command

use colored::Colorize;
use reqwest::Method;

use crate::config::Config;
use crate::error::{Result, ReportlineError};
use crate::http::request::RequestDescriptor;

/// Send `METHOD path` through the authenticated client and print the body
///
/// JSON bodies are pretty-printed. A non-2xx status is reported as an
/// application error after the status line is printed.
pub async fn send(config: &Config, method: &str, path: &str, body: Option<&str>) -> Result<()> {
    let mut request = RequestDescriptor::new(parse_method(method)?, path);
    if let Some(raw) = body {
        request = request.with_json(parse_body(raw)?);
    }

    let manager = super::connect(config)?;
    let response = manager.client().execute(request).await?;

    let status = format!("HTTP {}", response.status);
    if response.is_success() {
        eprintln!("{}", status.green());
    } else {
        eprintln!("{}", status.red());
    }

    let response = response.error_for_status()?;
    if !response.body.is_empty() {
        println!("{}", pretty_body(&response.body));
    }
    Ok(())
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| ReportlineError::InvalidInput(format!("invalid HTTP method: {}", method)).into())
}

fn parse_body(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| ReportlineError::InvalidInput(format!("body is not valid JSON: {}", e)).into())
}

fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}
