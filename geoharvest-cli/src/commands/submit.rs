//! Submit command - queue a new request for the daemon.

use std::path::PathBuf;

use geoharvest::model::NewRequest;
use tracing::info;

use super::common::build_parameters;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the submit command.
pub struct SubmitArgs {
    pub name: String,
    pub protocol: String,
    pub destination: PathBuf,
    pub params: Vec<String>,
    pub params_json: Option<String>,
    pub concurrency: usize,
}

/// Run the submit command.
pub fn run(runner: &CliRunner, args: SubmitArgs) -> Result<(), CliError> {
    runner.log_startup("submit");

    let registry = runner.registry();
    if !registry.contains(&args.protocol) {
        return Err(CliError::InvalidArgument(format!(
            "unknown protocol '{}' (available: {})",
            args.protocol,
            registry.protocols().join(", ")
        )));
    }

    let parameters = build_parameters(args.params_json.as_deref(), &args.params)?;
    let request = runner.store().create_request(
        NewRequest::new(args.name, args.protocol, args.destination)
            .with_parameters(parameters)
            .with_concurrency(args.concurrency),
    )?;

    info!(request = %request.id, protocol = %request.protocol, "Request submitted");
    println!("Submitted {} ({})", request.id, request.name);
    println!("  Protocol:    {}", request.protocol);
    println!("  Destination: {}", request.destination.display());
    if request.requested_concurrency > 0 {
        println!("  Concurrency: {}", request.requested_concurrency);
    }
    Ok(())
}
