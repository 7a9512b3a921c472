//! Typed application endpoints issued through the authenticated client

pub mod incidents;

pub use incidents::{Incident, IncidentApi, NewIncident};
