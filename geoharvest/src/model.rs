//! Persistent domain records: requests, constituents and process records.
//!
//! These are plain data types. They are created and mutated exclusively
//! through a [`StateStore`](crate::store::StateStore); none of them carries a
//! stored state field. The lifecycle state of a request or constituent is
//! always derived on demand (see [`crate::state`]).
//!
//! # Ownership
//!
//! ```text
//! Request ──┬── Constituent ── ConstituentProcess (0..1)
//!           ├── Constituent ── ConstituentProcess (0..1)
//!           └── RequestProcess (0..1)
//! ```
//!
//! Deleting a request cascades to its constituents and to every process
//! record that refers to either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw numeric value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(
    /// Store-assigned identifier of a [`Request`].
    RequestId,
    "request"
);
record_id!(
    /// Store-assigned identifier of a [`Constituent`].
    ConstituentId,
    "constituent"
);
record_id!(
    /// Store-assigned identifier of a [`ProcessRecord`].
    ProcessId,
    "process"
);

// =============================================================================
// Requests
// =============================================================================

/// Submission payload for a new request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Human-readable name.
    pub name: String,
    /// Protocol (end point) name, used to resolve the retriever.
    pub protocol: String,
    /// Retriever-specific parameters (area of interest, time range, ...).
    ///
    /// Opaque to the orchestration core.
    pub parameters: serde_json::Value,
    /// Directory where the request's outputs land.
    pub destination: PathBuf,
    /// Requested constituent parallelism. `0` means "all at once".
    pub requested_concurrency: usize,
}

impl NewRequest {
    /// Creates a submission with empty parameters and unbounded concurrency.
    pub fn new(
        name: impl Into<String>,
        protocol: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            parameters: serde_json::Value::Object(serde_json::Map::new()),
            destination: destination.into(),
            requested_concurrency: 0,
        }
    }

    /// Sets the retriever parameters.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the requested constituent parallelism.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.requested_concurrency = concurrency;
        self
    }
}

/// A user-issued unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub name: String,
    pub protocol: String,
    pub parameters: serde_json::Value,
    pub destination: PathBuf,
    pub requested_concurrency: usize,
    /// Set once, false → true, when a processor claims the request.
    pub started: bool,
    /// Set once, false → true, after every constituent succeeded and
    /// aggregation finished.
    pub aggregation_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub(crate) fn from_submission(id: RequestId, new: NewRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            protocol: new.protocol,
            parameters: new.parameters,
            destination: new.destination,
            requested_concurrency: new.requested_concurrency,
            started: false,
            aggregation_complete: false,
            created_at,
        }
    }
}

// =============================================================================
// Constituents
// =============================================================================

/// One named output artifact of a request plus the raw inputs that build it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub id: ConstituentId,
    pub request: RequestId,
    /// Planned destination path; unique within the owning request.
    pub key: PathBuf,
    /// Raw input references (paths, URLs, scene ids).
    pub inputs: Vec<String>,
    pub started: bool,
    /// Set once the artifact exists on disk.
    pub destination: Option<PathBuf>,
    /// True for the artifact produced by the aggregation step.
    #[serde(default)]
    pub aggregate: bool,
}

// =============================================================================
// Process records
// =============================================================================

/// The unit of work a process record vouches for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProcessOwner {
    /// The job daemon itself.
    Daemon,
    Request(RequestId),
    Constituent(ConstituentId),
}

impl fmt::Display for ProcessOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daemon => write!(f, "daemon"),
            Self::Request(id) => write!(f, "{}", id),
            Self::Constituent(id) => write!(f, "{}", id),
        }
    }
}

/// Ephemeral liveness marker associating an OS pid with a unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: ProcessId,
    pub pid: u32,
    pub owner: ProcessOwner,
    /// Parent record; removing the parent removes this record too.
    pub parent: Option<ProcessId>,
    pub registered_at: DateTime<Utc>,
}

/// Returns the pid of the current process, as recorded in process records.
pub fn current_pid() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_prefixes() {
        assert_eq!(RequestId(7).to_string(), "request-7");
        assert_eq!(ConstituentId(3).to_string(), "constituent-3");
        assert_eq!(ProcessId(11).to_string(), "process-11");
    }

    #[test]
    fn test_new_request_defaults() {
        let new = NewRequest::new("toa", "local", "/out");
        assert_eq!(new.requested_concurrency, 0);
        assert!(new.parameters.as_object().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn test_process_owner_serializes_tagged() {
        let json = serde_json::to_string(&ProcessOwner::Request(RequestId(4))).unwrap();
        assert_eq!(json, r#"{"kind":"request","id":4}"#);

        let daemon: ProcessOwner = serde_json::from_str(r#"{"kind":"daemon"}"#).unwrap();
        assert_eq!(daemon, ProcessOwner::Daemon);
    }

    #[test]
    fn test_constituent_aggregate_defaults_false() {
        let json = r#"{"id":1,"request":2,"key":"/out/a.tif","inputs":["in1"],"started":false,"destination":null}"#;
        let constituent: Constituent = serde_json::from_str(json).unwrap();
        assert!(!constituent.aggregate);
        assert_eq!(constituent.request, RequestId(2));
    }
}
