//! Pool-based distribution with a fixed ceiling on running workers.

use super::{run_guarded, DistributionStrategy, ErrorChannel, StrategyFuture};
use crate::processor::ConstituentProcessor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Keeps up to `limit` workers running, starting the next processor as soon
/// as a slot frees up.
///
/// Each worker is its own tokio task. Completion order is unspecified.
#[derive(Debug, Clone, Copy)]
pub struct BoundedParallel {
    limit: usize,
}

impl BoundedParallel {
    /// Creates a pool of `limit` slots (at least one).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl DistributionStrategy for BoundedParallel {
    fn name(&self) -> &'static str {
        "bounded-parallel"
    }

    fn run<'a>(
        &'a self,
        processors: &'a [Arc<ConstituentProcessor>],
        errors: &'a ErrorChannel,
    ) -> StrategyFuture<'a> {
        Box::pin(async move {
            let slots = Arc::new(Semaphore::new(self.limit));
            let mut workers = JoinSet::new();

            for processor in processors {
                // The semaphore is never closed, so acquisition only waits.
                let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                    break;
                };
                let processor = Arc::clone(processor);
                let errors = errors.clone();
                debug!(key = %processor.key().display(), "Starting constituent worker");
                workers.spawn(async move {
                    let _permit = permit;
                    run_guarded(&processor, &errors).await;
                });
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Constituent worker task did not finish");
                    errors.report(PathBuf::new(), format!("worker task failed: {}", e));
                }
            }
        })
    }
}
