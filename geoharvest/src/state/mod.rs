//! Derived lifecycle state for requests and constituents.
//!
//! State is never stored. It is computed from three observations:
//!
//! - the record's `started` / `aggregation_complete` flags
//! - whether a process record currently vouches for the unit of work
//! - whether the produced artifact exists on disk
//!
//! ```text
//!                 started                  artifact / aggregation flag
//!   PENDING ───────────────► RUNNING ─────────────────────────► COMPLETE
//!                               │
//!                               │ process record reaped, no artifact
//!                               ▼
//!                             FAILED
//! ```
//!
//! A crashed worker leaves its process record behind; the record keeps the
//! unit RUNNING until housekeeping reaps it, after which the same query
//! reports FAILED. The derivation functions are pure so they can be tested
//! without a live process table or filesystem.

mod inspector;
mod liveness;

pub use inspector::{ArtifactProbe, FsArtifactProbe, RequestStatus, StateInspector};
pub use liveness::{OsProcessTable, ProcessLiveness};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state shared by requests and constituents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessState {
    Pending,
    Running,
    Complete,
    Failed,
}

impl ProcessState {
    /// Returns true for COMPLETE and FAILED.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns the upper-case label used in status output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives a constituent's state.
///
/// * `destination_exists` - the constituent has a destination and it exists on disk
/// * `has_process` - a process record for the constituent is present
pub fn derive_constituent_state(
    started: bool,
    destination_exists: bool,
    has_process: bool,
) -> ProcessState {
    if destination_exists {
        ProcessState::Complete
    } else if !started {
        ProcessState::Pending
    } else if has_process {
        ProcessState::Running
    } else {
        ProcessState::Failed
    }
}

/// Derives a request's state from its flags, its own process record and the
/// already-derived states of its constituents.
pub fn derive_request_state(
    started: bool,
    aggregation_complete: bool,
    has_process: bool,
    constituents: &[ProcessState],
) -> ProcessState {
    if aggregation_complete {
        return ProcessState::Complete;
    }
    if !started {
        return ProcessState::Pending;
    }
    if has_process || constituents.contains(&ProcessState::Running) {
        return ProcessState::Running;
    }
    ProcessState::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_constituent_not_started_is_pending() {
        assert_eq!(
            derive_constituent_state(false, false, false),
            ProcessState::Pending
        );
    }

    #[test]
    fn test_constituent_started_with_process_is_running() {
        assert_eq!(
            derive_constituent_state(true, false, true),
            ProcessState::Running
        );
    }

    #[test]
    fn test_constituent_started_without_process_is_failed() {
        assert_eq!(
            derive_constituent_state(true, false, false),
            ProcessState::Failed
        );
    }

    #[test]
    fn test_constituent_with_artifact_is_complete() {
        assert_eq!(
            derive_constituent_state(true, true, false),
            ProcessState::Complete
        );
    }

    #[test]
    fn test_request_aggregation_flag_wins() {
        assert_eq!(
            derive_request_state(true, true, false, &[ProcessState::Failed]),
            ProcessState::Complete
        );
    }

    #[test]
    fn test_request_live_child_keeps_running() {
        let children = [ProcessState::Complete, ProcessState::Running];
        assert_eq!(
            derive_request_state(true, false, false, &children),
            ProcessState::Running
        );
    }

    #[test]
    fn test_request_all_children_complete_without_aggregation_is_failed() {
        let children = [ProcessState::Complete, ProcessState::Complete];
        assert_eq!(
            derive_request_state(true, false, false, &children),
            ProcessState::Failed
        );
    }

    #[test]
    fn test_state_display_and_serde() {
        assert_eq!(ProcessState::Running.to_string(), "RUNNING");
        let json = serde_json::to_string(&ProcessState::Failed).unwrap();
        assert_eq!(json, "\"FAILED\"");
    }

    proptest! {
        #[test]
        fn prop_artifact_on_disk_iff_complete(
            started in any::<bool>(),
            exists in any::<bool>(),
            process in any::<bool>(),
        ) {
            let state = derive_constituent_state(started, exists, process);
            prop_assert_eq!(state == ProcessState::Complete, exists);
        }

        #[test]
        fn prop_unstarted_request_never_running_or_failed(
            process in any::<bool>(),
            children in proptest::collection::vec(
                prop_oneof![
                    Just(ProcessState::Pending),
                    Just(ProcessState::Running),
                    Just(ProcessState::Complete),
                    Just(ProcessState::Failed),
                ],
                0..8,
            ),
        ) {
            let state = derive_request_state(false, false, process, &children);
            prop_assert_eq!(state, ProcessState::Pending);
        }

        #[test]
        fn prop_started_request_without_liveness_is_failed(
            children in proptest::collection::vec(
                prop_oneof![
                    Just(ProcessState::Pending),
                    Just(ProcessState::Complete),
                    Just(ProcessState::Failed),
                ],
                0..8,
            ),
        ) {
            let state = derive_request_state(true, false, false, &children);
            prop_assert_eq!(state, ProcessState::Failed);
        }
    }
}
