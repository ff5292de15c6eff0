//! Daemon command - run the job daemon until interrupted.

use geoharvest::daemon::{DaemonConfig, JobDaemon};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the daemon command.
///
/// Ctrl+C stops the loop and deregisters the daemon. The runtime is dropped
/// when `block_on` returns, which drops any request still in flight: its
/// process records are deregistered and its external tools are killed. Such
/// a request shows as FAILED and resumes with `geoharvest run <id>`.
pub fn run(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("daemon");
    let config = DaemonConfig::from(runner.config());

    println!(
        "Job daemon started (max {} concurrent request(s), polling every {}s)",
        config.max_concurrent_requests,
        config.poll_interval.as_secs()
    );
    println!("Press Ctrl+C to stop.");

    let daemon = JobDaemon::new(runner.store(), runner.registry(), config, runner.logger());
    let shutdown = CancellationToken::new();

    let summary = runner.block_on(async {
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => warn!(error = %e, "Could not listen for Ctrl+C; stopping daemon"),
            }
            signal_token.cancel();
        });
        daemon.run(shutdown).await
    })??;

    println!();
    println!("Job daemon stopped");
    println!("  Poll iterations:   {}", summary.iterations);
    println!("  Requests started:  {}", summary.spawned);
    println!("  Records reaped:    {}", summary.reaped);
    println!("  Requests purged:   {}", summary.purged);
    println!();
    println!("Requests interrupted by shutdown are FAILED; resume them with 'geoharvest run <id>'.");
    Ok(())
}
