//! Status command - derived state of one or all requests.

use geoharvest::model::Request;
use geoharvest::state::{RequestStatus, StateInspector};

use super::common::parse_request_id;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the status command.
///
/// Without an id every request is listed; with one, its constituents are
/// shown as well.
pub fn run(runner: &CliRunner, id: Option<String>, json: bool) -> Result<(), CliError> {
    let store = runner.store();
    let inspector = StateInspector::new(store.clone());

    match id {
        Some(raw) => {
            let id = parse_request_id(&raw)?;
            let request = store
                .request(id)?
                .ok_or_else(|| CliError::InvalidArgument(format!("{} not found", id)))?;
            let status = inspector.request_status(id);
            if json {
                print_json(&status)?;
            } else {
                print_request(&request, &status);
                println!();
                for constituent in store.constituents(id)? {
                    let state = inspector.constituent_state(&constituent);
                    let marker = if constituent.aggregate { " (aggregate)" } else { "" };
                    println!(
                        "  {:<9} {}{}",
                        state.as_str(),
                        constituent.key.display(),
                        marker
                    );
                }
            }
        }
        None => {
            let requests = store.requests()?;
            let statuses: Vec<RequestStatus> = requests
                .iter()
                .map(|r| inspector.request_status(r.id))
                .collect();
            if json {
                print_json(&statuses)?;
            } else if requests.is_empty() {
                println!("No requests.");
            } else {
                println!("{:<12} {:<9} {:>9}  {}", "ID", "STATE", "PROGRESS", "NAME");
                for (request, status) in requests.iter().zip(&statuses) {
                    println!(
                        "{:<12} {:<9} {:>9}  {}",
                        request.id.to_string(),
                        status.state.as_str(),
                        progress(status),
                        request.name
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_request(request: &Request, status: &RequestStatus) {
    println!("{} ({})", request.id, request.name);
    println!("  State:        {}", status.state);
    println!("  Protocol:     {}", request.protocol);
    println!("  Destination:  {}", request.destination.display());
    println!("  Submitted:    {}", request.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "  Constituents: {} total, {} complete, {} running, {} failed, {} pending",
        status.total, status.complete, status.running, status.failed, status.pending
    );
}

fn progress(status: &RequestStatus) -> String {
    format!("{}/{}", status.complete, status.total)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::InvalidArgument(format!("cannot render status: {}", e)))?;
    println!("{}", text);
    Ok(())
}
