//! Request and constituent processors.
//!
//! # Lifecycle
//!
//! ```text
//!                 RequestProcessor::run()
//!                          │
//!     ┌────────────────────┼──────────────────────────────────────┐
//!     │ 1. register record, set started          (PENDING → RUNNING)
//!     │ 2. resolve retriever from protocol
//!     │ 3. effective = min(retriever cap, requested, distributor cap)
//!     │ 4. list constituents          (empty → NoConstituents)
//!     │ 5. ensure Constituent rows, build ConstituentProcessors
//!     │ 6. Distributor::distribute()  (any failure → RequestFailed)
//!     │ 7. aggregate, record artifact as one more constituent
//!     │ 8. set aggregation_complete, deregister      (→ COMPLETE)
//!     └────────────────────┼──────────────────────────────────────┘
//!                          │ error in 2-7
//!                          ▼
//!                     clean_up() and return the error
//! ```
//!
//! Process records are held by [`ProcessRegistration`] guards. Dropping a
//! guard deregisters the record, so bookkeeping is released on every exit
//! path including a panic inside a retriever.

mod constituent;
mod registration;
mod request;

pub use constituent::ConstituentProcessor;
pub use registration::ProcessRegistration;
pub use request::{ProcessorConfig, RequestProcessor};

use crate::model::RequestId;
use crate::retriever::RetrieverError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`RequestProcessor::run`].
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The retriever produced an empty decomposition.
    #[error("{0} decomposed into no constituents")]
    NoConstituents(RequestId),

    /// At least one constituent did not complete.
    #[error("{request} failed: {failed} constituent(s) did not complete")]
    RequestFailed { request: RequestId, failed: usize },

    /// No retriever is registered for the request's protocol.
    #[error("no retriever registered for protocol '{0}'")]
    UnknownProtocol(String),

    /// The request does not exist in the store.
    #[error("{0} not found")]
    NotFound(RequestId),

    #[error(transparent)]
    Retriever(RetrieverError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RetrieverError> for ProcessorError {
    fn from(err: RetrieverError) -> Self {
        match err {
            RetrieverError::UnknownProtocol(protocol) => Self::UnknownProtocol(protocol),
            other => Self::Retriever(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_protocol_is_lifted() {
        let err: ProcessorError = RetrieverError::UnknownProtocol("wms".into()).into();
        assert!(matches!(err, ProcessorError::UnknownProtocol(p) if p == "wms"));

        let err: ProcessorError = RetrieverError::Unreachable("ftp".into()).into();
        assert!(matches!(err, ProcessorError::Retriever(_)));
    }

    #[test]
    fn test_request_failed_message() {
        let err = ProcessorError::RequestFailed {
            request: RequestId(2),
            failed: 1,
        };
        assert_eq!(
            err.to_string(),
            "request-2 failed: 1 constituent(s) did not complete"
        );
    }
}
