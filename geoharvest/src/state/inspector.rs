//! State queries against a live store.

use super::{derive_constituent_state, derive_request_state, ProcessState};
use crate::model::{Constituent, ProcessOwner, RequestId};
use crate::store::StateStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Checks whether a produced artifact exists.
pub trait ArtifactProbe: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
}

/// Probes the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactProbe;

impl ArtifactProbe for FsArtifactProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Snapshot of a request's derived state and constituent breakdown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestStatus {
    pub request: RequestId,
    pub state: ProcessState,
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
}

impl RequestStatus {
    fn unknown(request: RequestId) -> Self {
        Self {
            request,
            state: ProcessState::Failed,
            total: 0,
            pending: 0,
            running: 0,
            complete: 0,
            failed: 0,
        }
    }
}

/// Computes derived states from the store's current contents.
///
/// Queries never fail: a missing record or an unreadable store is reported
/// as FAILED.
#[derive(Clone)]
pub struct StateInspector {
    store: Arc<dyn StateStore>,
    probe: Arc<dyn ArtifactProbe>,
}

impl StateInspector {
    /// Creates an inspector that probes the local filesystem.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_probe(store, Arc::new(FsArtifactProbe))
    }

    pub fn with_probe(store: Arc<dyn StateStore>, probe: Arc<dyn ArtifactProbe>) -> Self {
        Self { store, probe }
    }

    /// Derives the state of one constituent record.
    pub fn constituent_state(&self, constituent: &Constituent) -> ProcessState {
        let destination_exists = constituent
            .destination
            .as_deref()
            .is_some_and(|path| self.probe.exists(path));
        let has_process = matches!(
            self.store
                .find_process(ProcessOwner::Constituent(constituent.id)),
            Ok(Some(_))
        );
        derive_constituent_state(constituent.started, destination_exists, has_process)
    }

    /// Derives the state of a request.
    pub fn request_state(&self, id: RequestId) -> ProcessState {
        self.request_status(id).state
    }

    /// Derives the state of a request together with constituent counts.
    pub fn request_status(&self, id: RequestId) -> RequestStatus {
        let Ok(Some(request)) = self.store.request(id) else {
            return RequestStatus::unknown(id);
        };
        let Ok(constituents) = self.store.constituents(id) else {
            return RequestStatus::unknown(id);
        };

        let states: Vec<ProcessState> = constituents
            .iter()
            .map(|c| self.constituent_state(c))
            .collect();
        let has_process = matches!(
            self.store.find_process(ProcessOwner::Request(id)),
            Ok(Some(_))
        );
        let count = |wanted: ProcessState| states.iter().filter(|s| **s == wanted).count();

        RequestStatus {
            request: id,
            state: derive_request_state(
                request.started,
                request.aggregation_complete,
                has_process,
                &states,
            ),
            total: states.len(),
            pending: count(ProcessState::Pending),
            running: count(ProcessState::Running),
            complete: count(ProcessState::Complete),
            failed: count(ProcessState::Failed),
        }
    }
}
