//! One-shot maintenance commands: housekeeping and retention purge.
//!
//! These run the same passes the daemon performs periodically, for
//! installations that do not keep a daemon running.

use chrono::Utc;
use geoharvest::daemon::{Housekeeper, RetentionPolicy};
use geoharvest::state::{OsProcessTable, StateInspector};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Remove process records whose pid is no longer running.
pub fn housekeep(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("housekeep");
    let report = Housekeeper::new(runner.store()).sweep(&OsProcessTable::new())?;

    println!("Examined {} process record(s)", report.examined);
    if report.is_clean() {
        println!("No stale records found.");
        return Ok(());
    }
    for record in &report.reaped {
        println!("  reaped {} (pid {}, {})", record.id, record.pid, record.owner);
    }
    println!("Removed {} record(s) in total", report.removed);
    Ok(())
}

/// Delete finished requests older than the retention window.
///
/// `days` overrides `[daemon] retention_days` from the config.
pub fn purge(runner: &CliRunner, days: Option<u32>) -> Result<(), CliError> {
    runner.log_startup("purge");
    let days = days.unwrap_or(runner.config().daemon.retention_days);
    let store = runner.store();
    let policy = RetentionPolicy::new(store.clone(), StateInspector::new(store), days);

    if !policy.is_enabled() {
        println!("Retention is disabled (retention_days = 0); nothing to purge.");
        println!("Pass --days N to purge requests finished more than N days ago.");
        return Ok(());
    }

    let purged = policy.purge(Utc::now())?;
    if purged.is_empty() {
        println!("No finished requests older than {} day(s).", days);
    } else {
        for id in &purged {
            println!("  purged {}", id);
        }
        println!("Purged {} request(s)", purged.len());
    }
    Ok(())
}
