//! Age-based purge of finished requests.

use crate::model::RequestId;
use crate::state::StateInspector;
use crate::store::{StateStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Deletes COMPLETE and FAILED requests older than a retention window.
///
/// Only store records are removed; artifacts on disk are left in place.
/// PENDING and RUNNING requests are never touched.
#[derive(Clone)]
pub struct RetentionPolicy {
    store: Arc<dyn StateStore>,
    inspector: StateInspector,
    retention_days: u32,
}

impl RetentionPolicy {
    /// Creates a policy. `retention_days == 0` disables purging.
    pub fn new(store: Arc<dyn StateStore>, inspector: StateInspector, retention_days: u32) -> Self {
        Self {
            store,
            inspector,
            retention_days,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.retention_days > 0
    }

    /// Deletes every expired terminal request as of `now`.
    pub fn purge(&self, now: DateTime<Utc>) -> Result<Vec<RequestId>, StoreError> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }
        // A window reaching past the representable range expires nothing.
        let Some(cutoff) = Duration::try_days(i64::from(self.retention_days))
            .and_then(|window| now.checked_sub_signed(window))
        else {
            debug!(retention_days = self.retention_days, "Retention window exceeds date range, nothing to purge");
            return Ok(Vec::new());
        };

        let mut purged = Vec::new();
        for request in self.store.requests()? {
            if request.created_at >= cutoff {
                continue;
            }
            let state = self.inspector.request_state(request.id);
            if !state.is_terminal() {
                debug!(request = %request.id, state = %state, "Expired request still active, keeping");
                continue;
            }
            if self.store.delete_request(request.id)? {
                purged.push(request.id);
            }
        }

        if !purged.is_empty() {
            info!(purged = purged.len(), retention_days = self.retention_days, "Purged expired requests");
        }
        Ok(purged)
    }
}
