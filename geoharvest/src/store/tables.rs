//! Table operations shared by the memory and file stores.

use super::StoreError;
use crate::model::{
    Constituent, ConstituentId, NewRequest, ProcessId, ProcessOwner, ProcessRecord, Request,
    RequestId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// All persisted records. Keys are raw record ids.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(super) struct Tables {
    next_id: u64,
    requests: BTreeMap<u64, Request>,
    constituents: BTreeMap<u64, Constituent>,
    processes: BTreeMap<u64, ProcessRecord>,
}

impl Tables {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn request_mut(&mut self, id: RequestId) -> Result<&mut Request, StoreError> {
        self.requests
            .get_mut(&id.get())
            .ok_or(StoreError::RequestNotFound(id))
    }

    fn constituent_mut(&mut self, id: ConstituentId) -> Result<&mut Constituent, StoreError> {
        self.constituents
            .get_mut(&id.get())
            .ok_or(StoreError::ConstituentNotFound(id))
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    pub fn create_request(&mut self, new: NewRequest) -> Request {
        let id = RequestId(self.allocate());
        let request = Request::from_submission(id, new, Utc::now());
        self.requests.insert(id.get(), request.clone());
        request
    }

    pub fn request(&self, id: RequestId) -> Option<Request> {
        self.requests.get(&id.get()).cloned()
    }

    pub fn requests(&self) -> Vec<Request> {
        let mut all: Vec<Request> = self.requests.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    pub fn pending_requests(&self, limit: usize) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| !r.started)
            .take(limit)
            .collect()
    }

    pub fn mark_request_started(&mut self, id: RequestId) -> Result<Request, StoreError> {
        let request = self.request_mut(id)?;
        request.started = true;
        Ok(request.clone())
    }

    pub fn mark_aggregation_complete(&mut self, id: RequestId) -> Result<Request, StoreError> {
        let request = self.request_mut(id)?;
        request.aggregation_complete = true;
        Ok(request.clone())
    }

    pub fn delete_request(&mut self, id: RequestId) -> bool {
        if self.requests.remove(&id.get()).is_none() {
            return false;
        }

        let owned: Vec<u64> = self
            .constituents
            .iter()
            .filter(|(_, c)| c.request == id)
            .map(|(key, _)| *key)
            .collect();

        let doomed: Vec<ProcessId> = self
            .processes
            .values()
            .filter(|p| match p.owner {
                ProcessOwner::Request(r) => r == id,
                ProcessOwner::Constituent(c) => owned.contains(&c.get()),
                ProcessOwner::Daemon => false,
            })
            .map(|p| p.id)
            .collect();
        for process in doomed {
            self.deregister_process(process);
        }

        for key in owned {
            self.constituents.remove(&key);
        }
        true
    }

    // -------------------------------------------------------------------------
    // Constituents
    // -------------------------------------------------------------------------

    pub fn ensure_constituent(
        &mut self,
        request: RequestId,
        key: PathBuf,
        inputs: Vec<String>,
    ) -> Result<Constituent, StoreError> {
        if !self.requests.contains_key(&request.get()) {
            return Err(StoreError::RequestNotFound(request));
        }
        if let Some(existing) = self
            .constituents
            .values()
            .find(|c| c.request == request && c.key == key)
        {
            return Ok(existing.clone());
        }

        let id = ConstituentId(self.allocate());
        let constituent = Constituent {
            id,
            request,
            key,
            inputs,
            started: false,
            destination: None,
            aggregate: false,
        };
        self.constituents.insert(id.get(), constituent.clone());
        Ok(constituent)
    }

    pub fn constituent(&self, id: ConstituentId) -> Option<Constituent> {
        self.constituents.get(&id.get()).cloned()
    }

    pub fn constituents(&self, request: RequestId) -> Vec<Constituent> {
        self.constituents
            .values()
            .filter(|c| c.request == request)
            .cloned()
            .collect()
    }

    pub fn mark_constituent_started(&mut self, id: ConstituentId) -> Result<Constituent, StoreError> {
        let constituent = self.constituent_mut(id)?;
        constituent.started = true;
        Ok(constituent.clone())
    }

    pub fn set_constituent_destination(
        &mut self,
        id: ConstituentId,
        destination: PathBuf,
    ) -> Result<Constituent, StoreError> {
        let constituent = self.constituent_mut(id)?;
        constituent.destination = Some(destination);
        Ok(constituent.clone())
    }

    pub fn mark_constituent_aggregate(
        &mut self,
        id: ConstituentId,
    ) -> Result<Constituent, StoreError> {
        let constituent = self.constituent_mut(id)?;
        constituent.aggregate = true;
        Ok(constituent.clone())
    }

    // -------------------------------------------------------------------------
    // Process records
    // -------------------------------------------------------------------------

    pub fn register_process(
        &mut self,
        owner: ProcessOwner,
        pid: u32,
        parent: Option<ProcessId>,
    ) -> Result<ProcessRecord, StoreError> {
        match owner {
            ProcessOwner::Request(id) if !self.requests.contains_key(&id.get()) => {
                return Err(StoreError::RequestNotFound(id));
            }
            ProcessOwner::Constituent(id) if !self.constituents.contains_key(&id.get()) => {
                return Err(StoreError::ConstituentNotFound(id));
            }
            _ => {}
        }
        if owner != ProcessOwner::Daemon {
            if let Some(existing) = self.find_process(owner) {
                return Err(StoreError::AlreadyRegistered {
                    owner,
                    existing: existing.id,
                });
            }
        }

        let id = ProcessId(self.allocate());
        let record = ProcessRecord {
            id,
            pid,
            owner,
            parent,
            registered_at: Utc::now(),
        };
        self.processes.insert(id.get(), record.clone());
        Ok(record)
    }

    pub fn deregister_process(&mut self, id: ProcessId) -> usize {
        let mut removed = 0;
        let mut queue = vec![id];
        while let Some(next) = queue.pop() {
            if self.processes.remove(&next.get()).is_some() {
                removed += 1;
            }
            queue.extend(
                self.processes
                    .values()
                    .filter(|p| p.parent == Some(next))
                    .map(|p| p.id),
            );
        }
        removed
    }

    pub fn processes(&self) -> Vec<ProcessRecord> {
        self.processes.values().cloned().collect()
    }

    pub fn find_process(&self, owner: ProcessOwner) -> Option<ProcessRecord> {
        self.processes.values().find(|p| p.owner == owner).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables_with_request() -> (Tables, RequestId) {
        let mut tables = Tables::default();
        let request = tables.create_request(NewRequest::new("r", "local", "/out"));
        (tables, request.id)
    }

    #[test]
    fn test_ensure_constituent_is_idempotent() {
        let (mut tables, request) = tables_with_request();
        let first = tables
            .ensure_constituent(request, PathBuf::from("/out/a.tif"), vec!["in1".into()])
            .unwrap();
        let second = tables
            .ensure_constituent(request, PathBuf::from("/out/a.tif"), vec!["other".into()])
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.inputs, vec!["in1".to_string()]);
        assert_eq!(tables.constituents(request).len(), 1);
    }

    #[test]
    fn test_ensure_constituent_requires_request() {
        let mut tables = Tables::default();
        let err = tables
            .ensure_constituent(RequestId(1), PathBuf::from("/a"), vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::RequestNotFound(_)));
    }

    #[test]
    fn test_second_record_for_same_owner_rejected() {
        let (mut tables, request) = tables_with_request();
        let c = tables
            .ensure_constituent(request, PathBuf::from("/out/a.tif"), vec![])
            .unwrap();
        let owner = ProcessOwner::Constituent(c.id);

        let first = tables.register_process(owner, 100, None).unwrap();
        let err = tables.register_process(owner, 101, None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::AlreadyRegistered { existing, .. } if existing == first.id
        ));

        tables.deregister_process(first.id);
        assert!(tables.register_process(owner, 102, None).is_ok());
    }

    #[test]
    fn test_deregister_cascades_to_children() {
        let (mut tables, request) = tables_with_request();
        let a = tables
            .ensure_constituent(request, PathBuf::from("/out/a.tif"), vec![])
            .unwrap();
        let b = tables
            .ensure_constituent(request, PathBuf::from("/out/b.tif"), vec![])
            .unwrap();

        let parent = tables
            .register_process(ProcessOwner::Request(request), 1, None)
            .unwrap();
        tables
            .register_process(ProcessOwner::Constituent(a.id), 1, Some(parent.id))
            .unwrap();
        tables
            .register_process(ProcessOwner::Constituent(b.id), 1, Some(parent.id))
            .unwrap();

        assert_eq!(tables.deregister_process(parent.id), 3);
        assert!(tables.processes().is_empty());
        assert_eq!(tables.deregister_process(parent.id), 0);
    }

    #[test]
    fn test_daemon_records_may_coexist() {
        let mut tables = Tables::default();
        tables
            .register_process(ProcessOwner::Daemon, 1, None)
            .unwrap();
        tables
            .register_process(ProcessOwner::Daemon, 2, None)
            .unwrap();
        assert_eq!(tables.processes().len(), 2);
    }

    #[test]
    fn test_delete_request_cascades() {
        let (mut tables, request) = tables_with_request();
        let c = tables
            .ensure_constituent(request, PathBuf::from("/out/a.tif"), vec![])
            .unwrap();
        tables
            .register_process(ProcessOwner::Constituent(c.id), 1, None)
            .unwrap();
        tables
            .register_process(ProcessOwner::Daemon, 1, None)
            .unwrap();

        assert!(tables.delete_request(request));
        assert!(tables.request(request).is_none());
        assert!(tables.constituent(c.id).is_none());
        assert_eq!(tables.processes().len(), 1);
        assert!(!tables.delete_request(request));
    }

    #[test]
    fn test_pending_requests_oldest_first_with_limit() {
        let mut tables = Tables::default();
        let first = tables.create_request(NewRequest::new("a", "local", "/a"));
        let second = tables.create_request(NewRequest::new("b", "local", "/b"));
        let third = tables.create_request(NewRequest::new("c", "local", "/c"));
        tables.mark_request_started(second.id).unwrap();

        let pending = tables.pending_requests(10);
        let ids: Vec<RequestId> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);

        assert_eq!(tables.pending_requests(1).len(), 1);
    }

    #[test]
    fn test_flags_are_monotonic() {
        let (mut tables, request) = tables_with_request();
        tables.mark_request_started(request).unwrap();
        let again = tables.mark_request_started(request).unwrap();
        assert!(again.started);
        assert!(!again.aggregation_complete);
    }
}
