//! Persistent state for requests, constituents and process records.
//!
//! The orchestration core talks to persistence exclusively through the
//! [`StateStore`] trait. Every operation is an atomic single-record create,
//! update or delete; the core never needs multi-record transactions because
//! every entity has exactly one writer (one `RequestProcessor` per request,
//! one `ConstituentProcessor` per constituent).
//!
//! # Implementations
//!
//! - [`MemoryStateStore`] - in-process tables, for tests and one-shot runs
//! - [`FileStateStore`] - the same tables persisted as JSON, rewritten
//!   atomically after every mutation so state survives crashes

mod file;
mod memory;
mod tables;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use crate::model::{
    Constituent, ConstituentId, NewRequest, ProcessId, ProcessOwner, ProcessRecord, Request,
    RequestId,
};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced request does not exist.
    #[error("{0} not found")]
    RequestNotFound(RequestId),

    /// The referenced constituent does not exist.
    #[error("{0} not found")]
    ConstituentNotFound(ConstituentId),

    /// A live process record already vouches for this unit of work.
    #[error("{owner} already has a live process record ({existing})")]
    AlreadyRegistered {
        owner: ProcessOwner,
        existing: ProcessId,
    },

    /// Reading or writing the backing file failed.
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be encoded or decoded.
    #[error("state store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("state store task failed: {0}")]
    Task(String),
}

/// Runs blocking store work on tokio's blocking pool.
///
/// [`FileStateStore`] locks and rewrites its file on every call, so async
/// code reaches the store through this rather than calling it inline.
pub async fn run_blocking<T, F>(op: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Atomic single-record operations over requests, constituents and process
/// records.
///
/// Operations are synchronous and may block on disk I/O. Async callers go
/// through [`run_blocking`]; process-record deregistration runs from `Drop`
/// guards, which cannot await, and calls the store directly.
pub trait StateStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Creates a new, unstarted request.
    fn create_request(&self, new: NewRequest) -> Result<Request, StoreError>;

    fn request(&self, id: RequestId) -> Result<Option<Request>, StoreError>;

    /// Returns every request ordered by creation time.
    fn requests(&self) -> Result<Vec<Request>, StoreError>;

    /// Returns up to `limit` unstarted requests, oldest first.
    fn pending_requests(&self, limit: usize) -> Result<Vec<Request>, StoreError>;

    /// Sets `started`. Idempotent; the flag never reverts.
    fn mark_request_started(&self, id: RequestId) -> Result<Request, StoreError>;

    /// Sets `aggregation_complete`. Idempotent; the flag never reverts.
    fn mark_aggregation_complete(&self, id: RequestId) -> Result<Request, StoreError>;

    /// Deletes a request, its constituents and every related process record.
    ///
    /// Returns false if the request did not exist.
    fn delete_request(&self, id: RequestId) -> Result<bool, StoreError>;

    // -------------------------------------------------------------------------
    // Constituents
    // -------------------------------------------------------------------------

    /// Returns the constituent for `(request, key)`, creating it if needed.
    ///
    /// An existing record is returned unchanged; its inputs are not replaced.
    fn ensure_constituent(
        &self,
        request: RequestId,
        key: PathBuf,
        inputs: Vec<String>,
    ) -> Result<Constituent, StoreError>;

    fn constituent(&self, id: ConstituentId) -> Result<Option<Constituent>, StoreError>;

    /// Returns the constituents of a request ordered by id.
    fn constituents(&self, request: RequestId) -> Result<Vec<Constituent>, StoreError>;

    /// Sets `started`. Idempotent.
    fn mark_constituent_started(&self, id: ConstituentId) -> Result<Constituent, StoreError>;

    /// Records where the finished artifact lives.
    fn set_constituent_destination(
        &self,
        id: ConstituentId,
        destination: PathBuf,
    ) -> Result<Constituent, StoreError>;

    /// Flags a constituent as the request's aggregation artifact.
    fn mark_constituent_aggregate(&self, id: ConstituentId) -> Result<Constituent, StoreError>;

    // -------------------------------------------------------------------------
    // Process records
    // -------------------------------------------------------------------------

    /// Registers a process record.
    ///
    /// Fails with [`StoreError::AlreadyRegistered`] if the owner is a request
    /// or constituent that already has a record.
    fn register_process(
        &self,
        owner: ProcessOwner,
        pid: u32,
        parent: Option<ProcessId>,
    ) -> Result<ProcessRecord, StoreError>;

    /// Removes a process record and, transitively, every record whose
    /// parent is removed.
    ///
    /// Returns the number of records removed (0 if already gone).
    fn deregister_process(&self, id: ProcessId) -> Result<usize, StoreError>;

    fn processes(&self) -> Result<Vec<ProcessRecord>, StoreError>;

    fn find_process(&self, owner: ProcessOwner) -> Result<Option<ProcessRecord>, StoreError>;
}
