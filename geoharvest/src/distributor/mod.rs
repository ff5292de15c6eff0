//! Bounded execution of a batch of constituent processors.
//!
//! The [`Distributor`] runs every processor it is given to completion and
//! reports whether all of them succeeded. One failure never stops siblings
//! from being attempted; failures are collected on a shared
//! [`ErrorChannel`] and inspected once the whole batch has finished.
//!
//! # Strategies
//!
//! ```text
//! max_running == 1   ──► Sequential       one processor at a time, in order
//! max_running == 0   ──► BoundedParallel  limit = batch size (all at once)
//! max_running  > 1   ──► BoundedParallel  limit = min(max_running, batch size)
//! ```
//!
//! Both strategies return only after every submitted processor has either
//! completed or failed. A panic inside a processor is caught and reported as
//! a failure for its constituent.

mod bounded;
mod sequential;

pub use bounded::BoundedParallel;
pub use sequential::Sequential;

use crate::processor::ConstituentProcessor;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// =============================================================================
// Error channel
// =============================================================================

/// A failure signal emitted by one constituent worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstituentFailure {
    /// Planned destination of the failed constituent.
    pub key: PathBuf,
    pub message: String,
}

/// Sending half of the batch's failure channel, cloned into every worker.
#[derive(Clone, Debug)]
pub struct ErrorChannel {
    tx: mpsc::UnboundedSender<ConstituentFailure>,
}

/// Receiving half of an [`ErrorChannel`].
#[derive(Debug)]
pub struct FailureReceiver {
    rx: mpsc::UnboundedReceiver<ConstituentFailure>,
}

impl ErrorChannel {
    pub fn new() -> (Self, FailureReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, FailureReceiver { rx })
    }

    /// Records a failure. Never blocks.
    pub fn report(&self, key: impl Into<PathBuf>, message: impl Into<String>) {
        let failure = ConstituentFailure {
            key: key.into(),
            message: message.into(),
        };
        if self.tx.send(failure).is_err() {
            warn!("Failure reported after the distributor stopped listening");
        }
    }
}

impl FailureReceiver {
    /// Returns every failure reported so far.
    pub fn drain(&mut self) -> Vec<ConstituentFailure> {
        let mut failures = Vec::new();
        while let Ok(failure) = self.rx.try_recv() {
            failures.push(failure);
        }
        failures
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// Future returned by a distribution strategy.
pub type StrategyFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A way of running a batch of processors to completion.
pub trait DistributionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs every processor, reporting failures on `errors`.
    ///
    /// Must not return before all processors have finished.
    fn run<'a>(
        &'a self,
        processors: &'a [Arc<ConstituentProcessor>],
        errors: &'a ErrorChannel,
    ) -> StrategyFuture<'a>;
}

/// Runs one processor, converting a panic into a failure signal.
pub(crate) async fn run_guarded(processor: &ConstituentProcessor, errors: &ErrorChannel) {
    let outcome = AssertUnwindSafe(processor.run(errors)).catch_unwind().await;
    if let Err(payload) = outcome {
        let message = format!("worker panicked: {}", panic_message(payload.as_ref()));
        warn!(key = %processor.key().display(), %message, "Constituent worker panicked");
        errors.report(processor.key(), message);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

// =============================================================================
// Distributor
// =============================================================================

/// Runs a batch of constituent processors under a concurrency ceiling.
pub struct Distributor {
    processors: Vec<Arc<ConstituentProcessor>>,
    strategy: Box<dyn DistributionStrategy>,
    failures: Vec<ConstituentFailure>,
}

impl Distributor {
    /// Creates a distributor.
    ///
    /// `max_running` of 0 runs every processor at once; 1 runs them
    /// sequentially.
    pub fn new(processors: Vec<Arc<ConstituentProcessor>>, max_running: usize) -> Self {
        let strategy: Box<dyn DistributionStrategy> = match max_running {
            1 => Box::new(Sequential),
            0 => Box::new(BoundedParallel::new(processors.len())),
            n => Box::new(BoundedParallel::new(n.min(processors.len()))),
        };
        Self {
            processors,
            strategy,
            failures: Vec::new(),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Runs every processor to completion.
    ///
    /// Returns true iff no failure was reported.
    pub async fn distribute(&mut self) -> bool {
        let (errors, mut receiver) = ErrorChannel::new();
        debug!(
            constituents = self.processors.len(),
            strategy = self.strategy.name(),
            "Distributing constituents"
        );

        self.strategy.run(&self.processors, &errors).await;
        drop(errors);

        self.failures = receiver.drain();
        info!(
            constituents = self.processors.len(),
            failed = self.failures.len(),
            "Distribution finished"
        );
        self.failures.is_empty()
    }

    /// Failures collected by the last [`distribute`](Self::distribute) call.
    pub fn failures(&self) -> &[ConstituentFailure] {
        &self.failures
    }
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("constituents", &self.processors.len())
            .field("strategy", &self.strategy.name())
            .field("failures", &self.failures.len())
            .finish()
    }
}
