//! JSON-file state store.
//!
//! Every operation takes an advisory `flock` on a sibling `.lock` file and
//! reloads the snapshot from disk, so the CLI and a running daemon can share
//! one store. Mutations are written to a sibling temp file that is then
//! renamed over the real file; a crash mid-write leaves the previous snapshot
//! intact.

use super::tables::Tables;
use super::{StateStore, StoreError};
use crate::model::{
    Constituent, ConstituentId, NewRequest, ProcessId, ProcessOwner, ProcessRecord, Request,
    RequestId,
};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// State store persisted as a single JSON document.
///
/// Safe to share between processes on the same host. Within a process the
/// mutex serializes access; across processes the lock file does.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    lock_path: PathBuf,
    tables: Mutex<Tables>,
}

impl FileStateStore {
    /// Opens the store at `path`, loading the existing snapshot if present.
    ///
    /// The parent directory is created if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_path = sibling(&path, ".lock");

        let tables = {
            let _lock = FileLock::shared(&lock_path)?;
            load(&path)?
        };

        debug!(path = %path.display(), "Opened state store");
        Ok(Self {
            path,
            lock_path,
            tables: Mutex::new(tables),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let mut tables = self.tables.lock();
        let _lock = FileLock::shared(&self.lock_path)?;
        *tables = load(&self.path)?;
        Ok(f(&tables))
    }

    /// Applies a mutation to the latest snapshot and persists the result
    /// while still holding both locks.
    ///
    /// On a failed write the in-memory tables are rolled back so memory and
    /// disk never disagree.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self.tables.lock();
        let _lock = FileLock::exclusive(&self.lock_path)?;
        *tables = load(&self.path)?;
        let snapshot = tables.clone();
        let value = f(&mut tables)?;
        if let Err(e) = persist(&self.path, &tables) {
            *tables = snapshot;
            return Err(e);
        }
        Ok(value)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn load(path: &Path) -> Result<Tables, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Tables::default()),
        Err(e) => Err(e.into()),
    }
}

fn persist(path: &Path, tables: &Tables) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(tables)?;
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Advisory whole-file lock, released on drop.
struct FileLock {
    file: File,
}

impl FileLock {
    fn shared(path: &Path) -> io::Result<Self> {
        Self::acquire(path, libc::LOCK_SH)
    }

    fn exclusive(path: &Path) -> io::Result<Self> {
        Self::acquire(path, libc::LOCK_EX)
    }

    fn acquire(path: &Path, operation: libc::c_int) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        // SAFETY: the descriptor is owned by `file` and stays open for the
        // lifetime of the returned guard.
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // SAFETY: see `acquire`.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

impl StateStore for FileStateStore {
    fn create_request(&self, new: NewRequest) -> Result<Request, StoreError> {
        self.mutate(|t| Ok(t.create_request(new)))
    }

    fn request(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        self.read(|t| t.request(id))
    }

    fn requests(&self) -> Result<Vec<Request>, StoreError> {
        self.read(|t| t.requests())
    }

    fn pending_requests(&self, limit: usize) -> Result<Vec<Request>, StoreError> {
        self.read(|t| t.pending_requests(limit))
    }

    fn mark_request_started(&self, id: RequestId) -> Result<Request, StoreError> {
        self.mutate(|t| t.mark_request_started(id))
    }

    fn mark_aggregation_complete(&self, id: RequestId) -> Result<Request, StoreError> {
        self.mutate(|t| t.mark_aggregation_complete(id))
    }

    fn delete_request(&self, id: RequestId) -> Result<bool, StoreError> {
        self.mutate(|t| Ok(t.delete_request(id)))
    }

    fn ensure_constituent(
        &self,
        request: RequestId,
        key: PathBuf,
        inputs: Vec<String>,
    ) -> Result<Constituent, StoreError> {
        self.mutate(|t| t.ensure_constituent(request, key, inputs))
    }

    fn constituent(&self, id: ConstituentId) -> Result<Option<Constituent>, StoreError> {
        self.read(|t| t.constituent(id))
    }

    fn constituents(&self, request: RequestId) -> Result<Vec<Constituent>, StoreError> {
        self.read(|t| t.constituents(request))
    }

    fn mark_constituent_started(&self, id: ConstituentId) -> Result<Constituent, StoreError> {
        self.mutate(|t| t.mark_constituent_started(id))
    }

    fn set_constituent_destination(
        &self,
        id: ConstituentId,
        destination: PathBuf,
    ) -> Result<Constituent, StoreError> {
        self.mutate(|t| t.set_constituent_destination(id, destination))
    }

    fn mark_constituent_aggregate(&self, id: ConstituentId) -> Result<Constituent, StoreError> {
        self.mutate(|t| t.mark_constituent_aggregate(id))
    }

    fn register_process(
        &self,
        owner: ProcessOwner,
        pid: u32,
        parent: Option<ProcessId>,
    ) -> Result<ProcessRecord, StoreError> {
        self.mutate(|t| t.register_process(owner, pid, parent))
    }

    fn deregister_process(&self, id: ProcessId) -> Result<usize, StoreError> {
        self.mutate(|t| Ok(t.deregister_process(id)))
    }

    fn processes(&self) -> Result<Vec<ProcessRecord>, StoreError> {
        self.read(|t| t.processes())
    }

    fn find_process(&self, owner: ProcessOwner) -> Result<Option<ProcessRecord>, StoreError> {
        self.read(|t| t.find_process(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::open(dir.path().join("nested/state.json")).unwrap();
        assert!(store.requests().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let (request_id, constituent_id, process_id) = {
            let store = FileStateStore::open(&path).unwrap();
            let request = store
                .create_request(NewRequest::new("r", "local", "/out"))
                .unwrap();
            store.mark_request_started(request.id).unwrap();
            let c = store
                .ensure_constituent(request.id, PathBuf::from("/out/a.tif"), vec!["in".into()])
                .unwrap();
            let p = store
                .register_process(ProcessOwner::Constituent(c.id), 4242, None)
                .unwrap();
            (request.id, c.id, p.id)
        };

        let store = FileStateStore::open(&path).unwrap();
        let request = store.request(request_id).unwrap().unwrap();
        assert!(request.started);
        assert_eq!(store.constituents(request_id).unwrap()[0].id, constituent_id);

        let process = store
            .find_process(ProcessOwner::Constituent(constituent_id))
            .unwrap()
            .unwrap();
        assert_eq!(process.id, process_id);
        assert_eq!(process.pid, 4242);

        // Ids keep increasing after reopen.
        let next = store
            .create_request(NewRequest::new("s", "local", "/out2"))
            .unwrap();
        assert!(next.id.get() > process_id.get());
    }

    #[test]
    fn test_two_handles_see_each_others_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let daemon_side = FileStateStore::open(&path).unwrap();
        let cli_side = FileStateStore::open(&path).unwrap();

        assert!(daemon_side.pending_requests(10).unwrap().is_empty());
        let submitted = cli_side
            .create_request(NewRequest::new("late", "local", "/out"))
            .unwrap();

        let pending = daemon_side.pending_requests(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, submitted.id);

        daemon_side.mark_request_started(submitted.id).unwrap();
        assert!(cli_side.request(submitted.id).unwrap().unwrap().started);

        // Ids stay unique across handles.
        let other = daemon_side
            .create_request(NewRequest::new("next", "local", "/out"))
            .unwrap();
        assert_ne!(other.id, submitted.id);
    }

    #[test]
    fn test_failed_mutation_does_not_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::open(&path).unwrap();

        let err = store.mark_request_started(RequestId(1)).unwrap_err();
        assert!(matches!(err, StoreError::RequestNotFound(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let err = FileStateStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
