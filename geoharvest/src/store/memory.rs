//! In-memory state store.

use super::tables::Tables;
use super::{StateStore, StoreError};
use crate::model::{
    Constituent, ConstituentId, NewRequest, ProcessId, ProcessOwner, ProcessRecord, Request,
    RequestId,
};
use parking_lot::Mutex;
use std::path::PathBuf;

/// State store backed by in-process tables.
///
/// Nothing survives the process. Suitable for tests and for foreground runs
/// that do not need crash recovery.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    tables: Mutex<Tables>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn create_request(&self, new: NewRequest) -> Result<Request, StoreError> {
        Ok(self.tables.lock().create_request(new))
    }

    fn request(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.tables.lock().request(id))
    }

    fn requests(&self) -> Result<Vec<Request>, StoreError> {
        Ok(self.tables.lock().requests())
    }

    fn pending_requests(&self, limit: usize) -> Result<Vec<Request>, StoreError> {
        Ok(self.tables.lock().pending_requests(limit))
    }

    fn mark_request_started(&self, id: RequestId) -> Result<Request, StoreError> {
        self.tables.lock().mark_request_started(id)
    }

    fn mark_aggregation_complete(&self, id: RequestId) -> Result<Request, StoreError> {
        self.tables.lock().mark_aggregation_complete(id)
    }

    fn delete_request(&self, id: RequestId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().delete_request(id))
    }

    fn ensure_constituent(
        &self,
        request: RequestId,
        key: PathBuf,
        inputs: Vec<String>,
    ) -> Result<Constituent, StoreError> {
        self.tables.lock().ensure_constituent(request, key, inputs)
    }

    fn constituent(&self, id: ConstituentId) -> Result<Option<Constituent>, StoreError> {
        Ok(self.tables.lock().constituent(id))
    }

    fn constituents(&self, request: RequestId) -> Result<Vec<Constituent>, StoreError> {
        Ok(self.tables.lock().constituents(request))
    }

    fn mark_constituent_started(&self, id: ConstituentId) -> Result<Constituent, StoreError> {
        self.tables.lock().mark_constituent_started(id)
    }

    fn set_constituent_destination(
        &self,
        id: ConstituentId,
        destination: PathBuf,
    ) -> Result<Constituent, StoreError> {
        self.tables
            .lock()
            .set_constituent_destination(id, destination)
    }

    fn mark_constituent_aggregate(&self, id: ConstituentId) -> Result<Constituent, StoreError> {
        self.tables.lock().mark_constituent_aggregate(id)
    }

    fn register_process(
        &self,
        owner: ProcessOwner,
        pid: u32,
        parent: Option<ProcessId>,
    ) -> Result<ProcessRecord, StoreError> {
        self.tables.lock().register_process(owner, pid, parent)
    }

    fn deregister_process(&self, id: ProcessId) -> Result<usize, StoreError> {
        Ok(self.tables.lock().deregister_process(id))
    }

    fn processes(&self) -> Result<Vec<ProcessRecord>, StoreError> {
        Ok(self.tables.lock().processes())
    }

    fn find_process(&self, owner: ProcessOwner) -> Result<Option<ProcessRecord>, StoreError> {
        Ok(self.tables.lock().find_process(owner))
    }
}
