//! RAII ownership of a process record.

use crate::model::{current_pid, ProcessId, ProcessOwner, ProcessRecord};
use crate::store::{StateStore, StoreError};
use std::sync::Arc;
use tracing::{debug, warn};

/// A live process record, deregistered when released or dropped.
///
/// Releasing is idempotent. Errors during drop are logged, never raised.
pub struct ProcessRegistration {
    store: Arc<dyn StateStore>,
    record: ProcessRecord,
    released: bool,
}

impl ProcessRegistration {
    /// Registers a record for `owner` under the current process's pid.
    pub fn register(
        store: Arc<dyn StateStore>,
        owner: ProcessOwner,
        parent: Option<ProcessId>,
    ) -> Result<Self, StoreError> {
        let record = store.register_process(owner, current_pid(), parent)?;
        debug!(record = %record.id, owner = %owner, parent = ?parent, "Process record registered");
        Ok(Self {
            store,
            record,
            released: false,
        })
    }

    pub fn id(&self) -> ProcessId {
        self.record.id
    }

    pub fn record(&self) -> &ProcessRecord {
        &self.record
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Deregisters the record (and its children).
    ///
    /// Returns the number of records removed; 0 on repeated calls.
    pub fn release(&mut self) -> Result<usize, StoreError> {
        if self.released {
            return Ok(0);
        }
        let removed = self.store.deregister_process(self.record.id)?;
        self.released = true;
        debug!(record = %self.record.id, owner = %self.record.owner, removed, "Process record released");
        Ok(removed)
    }
}

impl Drop for ProcessRegistration {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(
                record = %self.record.id,
                owner = %self.record.owner,
                error = %e,
                "Failed to deregister process record; housekeeping will reap it"
            );
        }
    }
}

impl std::fmt::Debug for ProcessRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistration")
            .field("record", &self.record)
            .field("released", &self.released)
            .finish()
    }
}
