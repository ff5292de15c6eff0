//! Run command - process one request in the foreground.
//!
//! Safe to repeat: constituents that already completed are skipped, so a
//! failed or interrupted request resumes where it left off.

use std::time::Instant;

use geoharvest::daemon::DaemonConfig;
use geoharvest::processor::RequestProcessor;
use geoharvest::state::StateInspector;
use tracing::info;

use super::common::parse_request_id;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the run command.
pub fn run(runner: &CliRunner, id: &str) -> Result<(), CliError> {
    runner.log_startup("run");
    let id = parse_request_id(id)?;
    let config = DaemonConfig::from(runner.config()).processor;

    let processor = RequestProcessor::new(
        id,
        runner.store(),
        runner.registry(),
        config,
        runner.logger(),
    );

    println!("Processing {}...", id);
    let start = Instant::now();
    let result = runner.block_on(processor.run())?;
    let elapsed = start.elapsed();

    let status = StateInspector::new(runner.store()).request_status(id);
    println!(
        "  {} of {} constituent(s) complete",
        status.complete, status.total
    );

    let request = result?;
    info!(request = %id, elapsed_secs = elapsed.as_secs_f64(), "Request finished");
    println!(
        "✓ {} complete in {:.2}s: {}",
        request.id,
        elapsed.as_secs_f64(),
        request.destination.display()
    );
    Ok(())
}
