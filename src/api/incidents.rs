//! Incident report endpoints
//!
//! Typed wrappers over `/incidents`. Every call goes through [`ApiClient`],
//! so it is authenticated and survives an access-token expiry transparently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::session::RecordId;
use crate::error::{Result, ReportlineError};
use crate::http::client::ApiClient;

const INCIDENTS_PATH: &str = "/incidents";

/// An incident report as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Backend identifier
    pub id: RecordId,
    /// Short title
    pub title: String,
    /// Detailed description
    #[serde(default)]
    pub description: String,
    /// Category name
    #[serde(default)]
    pub category: String,
    /// Workflow status (e.g. `pending`, `resolved`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Street address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for filing a new incident.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
    /// Short summary, must not be blank
    pub title: String,
    /// Free-text details
    pub description: String,
    /// Category name, must not be blank
    pub category: String,
    /// Latitude in decimal degrees, -90 to 90
    pub latitude: f64,
    /// Longitude in decimal degrees, -180 to 180
    pub longitude: f64,
    /// Street address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl NewIncident {
    /// Checks the payload before it is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ReportlineError::InvalidInput`] for a blank title or
    /// category, or coordinates outside their valid ranges.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ReportlineError::InvalidInput("title cannot be empty".into()).into());
        }
        if self.category.trim().is_empty() {
            return Err(ReportlineError::InvalidInput("category cannot be empty".into()).into());
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ReportlineError::InvalidInput(format!(
                "latitude must be between -90 and 90, got {}",
                self.latitude
            ))
            .into());
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ReportlineError::InvalidInput(format!(
                "longitude must be between -180 and 180, got {}",
                self.longitude
            ))
            .into());
        }
        Ok(())
    }
}

/// Incident endpoints bound to an authenticated client.
#[derive(Debug, Clone)]
pub struct IncidentApi {
    client: ApiClient,
}

impl IncidentApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `GET /incidents`
    pub async fn list(&self) -> Result<Vec<Incident>> {
        self.client.get_json(INCIDENTS_PATH).await
    }

    /// `GET /incidents/{id}`
    pub async fn get(&self, id: &str) -> Result<Incident> {
        self.client
            .get_json(&format!("{INCIDENTS_PATH}/{}", id.trim_start_matches('/')))
            .await
    }

    /// `POST /incidents`, after local validation.
    pub async fn create(&self, incident: &NewIncident) -> Result<Incident> {
        incident.validate()?;
        let created: Incident = self.client.post_json(INCIDENTS_PATH, incident).await?;
        tracing::info!(id = %created.id, "incident filed");
        Ok(created)
    }
}
