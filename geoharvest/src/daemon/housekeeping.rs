//! Reaping of process records left behind by dead processes.
//!
//! A worker that crashes never deregisters its process record, so its unit
//! of work would read as RUNNING forever. The sweep removes every record
//! whose pid is gone from the process table; afterwards the derived state
//! of the affected request or constituent reads FAILED.

use crate::model::ProcessRecord;
use crate::state::ProcessLiveness;
use crate::store::{StateStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one housekeeping sweep.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HousekeepingReport {
    /// Records inspected.
    pub examined: usize,
    /// Records whose pid was dead when the sweep reached them.
    pub reaped: Vec<ProcessRecord>,
    /// Records removed in total, including children of reaped records.
    pub removed: usize,
}

impl HousekeepingReport {
    pub fn is_clean(&self) -> bool {
        self.reaped.is_empty()
    }
}

/// Sweeps stale process records out of a store.
#[derive(Clone)]
pub struct Housekeeper {
    store: Arc<dyn StateStore>,
}

impl Housekeeper {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Removes every process record whose pid is not alive.
    ///
    /// Each distinct pid is checked once per sweep.
    pub fn sweep(&self, liveness: &dyn ProcessLiveness) -> Result<HousekeepingReport, StoreError> {
        let records = self.store.processes()?;
        let mut report = HousekeepingReport {
            examined: records.len(),
            ..Default::default()
        };
        let mut alive: BTreeMap<u32, bool> = BTreeMap::new();

        for record in records {
            let is_alive = *alive
                .entry(record.pid)
                .or_insert_with(|| liveness.is_alive(record.pid));
            if is_alive {
                continue;
            }

            let removed = self.store.deregister_process(record.id)?;
            if removed > 0 {
                debug!(
                    record = %record.id,
                    owner = %record.owner,
                    pid = record.pid,
                    removed,
                    "Reaped stale process record"
                );
                report.removed += removed;
                report.reaped.push(record);
            }
        }

        if !report.is_clean() {
            info!(
                examined = report.examined,
                reaped = report.reaped.len(),
                removed = report.removed,
                "Housekeeping removed stale process records"
            );
        }
        Ok(report)
    }
}
