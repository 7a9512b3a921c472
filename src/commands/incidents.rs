use colored::Colorize;
use prettytable::{format, row, Table};

use crate::api::incidents::{Incident, IncidentApi, NewIncident};
use crate::cli::IncidentCommand;
use crate::config::Config;
use crate::error::Result;

/// Handle incident commands
pub async fn handle_incidents(config: &Config, command: IncidentCommand) -> Result<()> {
    let manager = super::connect(config)?;
    let api = IncidentApi::new(manager.client().clone());

    match command {
        IncidentCommand::List { json } => {
            let incidents = api.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&incidents)?);
            } else if incidents.is_empty() {
                println!("{}", "No incidents reported.".yellow());
            } else {
                println!("\nIncidents:");
                incidents_table(&incidents).printstd();
                println!();
            }
        }
        IncidentCommand::Show { id } => {
            let incident = api.get(&id).await?;
            print_incident(&incident);
        }
        IncidentCommand::Create {
            title,
            description,
            category,
            latitude,
            longitude,
            address,
        } => {
            let incident = api
                .create(&NewIncident {
                    title,
                    description,
                    category,
                    latitude,
                    longitude,
                    address,
                })
                .await?;
            println!(
                "{}",
                format!("Filed incident {}", incident.id).green()
            );
        }
    }

    Ok(())
}

fn incidents_table(incidents: &[Incident]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["ID", "Title", "Category", "Status", "Reported"]);

    for incident in incidents {
        let reported = incident
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![
            incident.id.to_string().cyan(),
            truncate(&incident.title, 40),
            incident.category,
            incident.status.as_deref().unwrap_or("-"),
            reported
        ]);
    }
    table
}

fn print_incident(incident: &Incident) {
    println!("{} {}", incident.id.to_string().cyan(), incident.title.bold());
    println!("  Category: {}", incident.category);
    if let Some(status) = &incident.status {
        println!("  Status:   {}", status);
    }
    println!("  Location: {:.5}, {:.5}", incident.latitude, incident.longitude);
    if let Some(address) = &incident.address {
        println!("  Address:  {}", address);
    }
    if let Some(created) = incident.created_at {
        println!("  Reported: {}", created.format("%Y-%m-%d %H:%M UTC"));
    }
    if !incident.description.is_empty() {
        println!();
        println!("{}", incident.description);
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
