//! Top-level state machine for one request.

use super::{ConstituentProcessor, ProcessRegistration, ProcessorError};
use crate::distributor::Distributor;
use crate::log::{Logger, ScopedLogger};
use crate::model::{ProcessId, ProcessOwner, Request, RequestId};
use crate::retriever::{Retriever, RetrieverConfig, RetrieverRegistry, UNBOUNDED};
use crate::store::{run_blocking, StateStore};
use crate::{log_debug, log_error, log_info, log_warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Settings shared by every request processor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub retrievers: RetrieverConfig,
    /// Upper bound on constituents running at once for any request.
    /// `0` leaves the bound to the retriever and the request.
    pub max_running: usize,
}

/// Drives one request from PENDING to COMPLETE, or to a failure.
///
/// A processor is single-use: build one per attempt. [`clean_up`] may be
/// called any number of times.
///
/// [`clean_up`]: Self::clean_up
pub struct RequestProcessor {
    id: RequestId,
    store: Arc<dyn StateStore>,
    registry: Arc<RetrieverRegistry>,
    config: ProcessorConfig,
    logger: ScopedLogger,
    registration: Mutex<Option<ProcessRegistration>>,
    constituents: Mutex<Vec<Arc<ConstituentProcessor>>>,
}

impl RequestProcessor {
    pub fn new(
        id: RequestId,
        store: Arc<dyn StateStore>,
        registry: Arc<RetrieverRegistry>,
        config: ProcessorConfig,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            id,
            store,
            registry,
            config,
            logger: ScopedLogger::new(logger, id.to_string()),
            registration: Mutex::new(None),
            constituents: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Registers this processor's process record and sets `started`.
    ///
    /// This is the PENDING → RUNNING transition. Calling it again after a
    /// successful call is a no-op.
    pub fn begin(&self) -> Result<Request, ProcessorError> {
        let mut slot = self.registration.lock();
        if slot.is_none() {
            self.load()?;
            *slot = Some(ProcessRegistration::register(
                Arc::clone(&self.store),
                ProcessOwner::Request(self.id),
                None,
            )?);
        }
        drop(slot);
        Ok(self.store.mark_request_started(self.id)?)
    }

    /// Runs the request to completion.
    ///
    /// On any error the processor cleans up before returning it. A request
    /// whose aggregation already completed is returned unchanged.
    pub async fn run(&self) -> Result<Request, ProcessorError> {
        let request = self.load()?;
        if request.aggregation_complete {
            log_info!(self.logger, "already complete");
            return Ok(request);
        }

        let request = self.begin()?;
        log_info!(self.logger, "started ({}, protocol {})", request.name, request.protocol);

        match self.execute(&request).await {
            Ok(done) => {
                self.release();
                log_info!(self.logger, "complete");
                Ok(done)
            }
            Err(e) => {
                log_error!(self.logger, "{}", e);
                self.clean_up();
                Err(e)
            }
        }
    }

    async fn execute(&self, request: &Request) -> Result<Request, ProcessorError> {
        let retriever = self
            .registry
            .resolve(request, &self.config.retrievers)?;
        let concurrency = self.effective_concurrency(request, retriever.as_ref());

        let plan = retriever.list_constituents().await?;
        if plan.is_empty() {
            return Err(ProcessorError::NoConstituents(self.id));
        }
        log_info!(
            self.logger,
            "{} constituent(s), concurrency {}",
            plan.len(),
            if concurrency == UNBOUNDED {
                "unbounded".to_string()
            } else {
                concurrency.to_string()
            }
        );

        let id = self.id;
        let store = Arc::clone(&self.store);
        let constituents = run_blocking(move || {
            plan.into_iter()
                .map(|(key, inputs)| store.ensure_constituent(id, key, inputs))
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;

        let parent = self.parent();
        let processors: Vec<_> = constituents
            .into_iter()
            .map(|constituent| {
                Arc::new(ConstituentProcessor::new(
                    constituent,
                    Arc::clone(&retriever),
                    parent,
                    Arc::clone(&self.store),
                    &self.logger,
                ))
            })
            .collect();
        *self.constituents.lock() = processors.clone();

        let max_running = if concurrency == UNBOUNDED { 0 } else { concurrency };
        let mut distributor = Distributor::new(processors, max_running);
        if !distributor.distribute().await {
            for failure in distributor.failures() {
                log_warn!(
                    self.logger,
                    "constituent {} failed: {}",
                    failure.key.display(),
                    failure.message
                );
            }
            return Err(ProcessorError::RequestFailed {
                request: self.id,
                failed: distributor.failures().len(),
            });
        }

        self.aggregate(retriever.as_ref()).await?;
        let store = Arc::clone(&self.store);
        Ok(run_blocking(move || store.mark_aggregation_complete(id)).await?)
    }

    /// Runs the retriever's aggregation and records its artifact.
    async fn aggregate(&self, retriever: &dyn Retriever) -> Result<(), ProcessorError> {
        let id = self.id;
        let store = Arc::clone(&self.store);
        let mut outputs: Vec<PathBuf> = run_blocking(move || store.constituents(id))
            .await?
            .into_iter()
            .filter(|c| !c.aggregate)
            .filter_map(|c| c.destination)
            .collect();
        outputs.sort();

        let Some(artifact) = retriever.aggregate(&outputs).await? else {
            log_debug!(self.logger, "no aggregation step");
            return Ok(());
        };

        let store = Arc::clone(&self.store);
        let recorded = artifact.clone();
        run_blocking(move || {
            let record = store.ensure_constituent(id, recorded.clone(), Vec::new())?;
            store.mark_constituent_started(record.id)?;
            store.mark_constituent_aggregate(record.id)?;
            store.set_constituent_destination(record.id, recorded)
        })
        .await?;
        log_info!(self.logger, "aggregated into {}", artifact.display());
        Ok(())
    }

    /// Minimum of the retriever's cap, the requested concurrency and the
    /// configured ceiling. [`UNBOUNDED`] if none applies.
    pub fn effective_concurrency(&self, request: &Request, retriever: &dyn Retriever) -> usize {
        let requested = match request.requested_concurrency {
            0 => UNBOUNDED,
            n => n,
        };
        let ceiling = match self.config.max_running {
            0 => UNBOUNDED,
            n => n,
        };
        retriever.max_concurrency().min(requested).min(ceiling).max(1)
    }

    /// Releases this processor's process record and verifies every
    /// constituent it owns. Safe to call repeatedly; never retries work.
    pub fn clean_up(&self) {
        self.release();
        let constituents = self.constituents.lock().clone();
        let incomplete = constituents.iter().filter(|c| !c.verify()).count();
        if incomplete > 0 {
            log_warn!(self.logger, "{} constituent(s) left incomplete", incomplete);
        }
    }

    fn release(&self) {
        if let Some(registration) = self.registration.lock().as_mut() {
            if let Err(e) = registration.release() {
                log_warn!(self.logger, "could not deregister process record: {}", e);
            }
        }
    }

    fn parent(&self) -> Option<ProcessId> {
        self.registration.lock().as_ref().map(ProcessRegistration::id)
    }

    fn load(&self) -> Result<Request, ProcessorError> {
        self.store
            .request(self.id)?
            .ok_or(ProcessorError::NotFound(self.id))
    }
}

impl std::fmt::Debug for RequestProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestProcessor")
            .field("request", &self.id)
            .field("registered", &self.parent())
            .finish()
    }
}
