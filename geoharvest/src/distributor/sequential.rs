//! One-at-a-time distribution.

use super::{run_guarded, DistributionStrategy, ErrorChannel, StrategyFuture};
use crate::processor::ConstituentProcessor;
use std::sync::Arc;

/// Runs processors one after another on the calling task.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl DistributionStrategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn run<'a>(
        &'a self,
        processors: &'a [Arc<ConstituentProcessor>],
        errors: &'a ErrorChannel,
    ) -> StrategyFuture<'a> {
        Box::pin(async move {
            for processor in processors {
                run_guarded(processor, errors).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributor::test_support::{processors, Probe};
    use crate::distributor::Distributor;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_never_overlaps() {
        let probe = Arc::new(Probe::default());
        let (_, batch) = processors(probe.clone(), &["a", "b", "c", "d"]);

        let mut distributor = Distributor::new(batch, 1);
        assert!(distributor.distribute().await);

        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_processors() {
        let probe = Arc::new(Probe {
            fail: vec!["a".into()],
            ..Default::default()
        });
        let (_, batch) = processors(probe.clone(), &["a", "b"]);

        let (errors, mut receiver) = ErrorChannel::new();
        Sequential.run(&batch, &errors).await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(receiver.drain().len(), 1);
    }
}
