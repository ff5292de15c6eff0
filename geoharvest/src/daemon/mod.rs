//! Job daemon: claims pending requests and runs them in the background.
//!
//! # Loop
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                             JobDaemon                              │
//! │                                                                    │
//! │  start ──► initial housekeeping ──► register Daemon record         │
//! │                                                                    │
//! │  every poll interval:                                              │
//! │    live   = number of Request process records                      │
//! │    claim  = up to (max_concurrent_requests - live) PENDING         │
//! │             requests, oldest first                                 │
//! │    spawn  = one task per claimed request: RequestProcessor::run()  │
//! │                                                                    │
//! │  every `housekeeping_every` iterations:                            │
//! │    Housekeeper::sweep() ──► RetentionPolicy::purge()               │
//! │                                                                    │
//! │  shutdown ──► detach request tasks, deregister Daemon record       │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request that fails is logged and the loop moves on. Request tasks
//! in flight at shutdown are detached, not awaited. They keep running only
//! while the tokio runtime lives. Once the runtime is dropped (the CLI
//! returns from `block_on`) each task is dropped with it: its
//! [`ProcessRegistration`] guards deregister the process records, and
//! external tools started with `kill_on_drop` are killed. The request is
//! then FAILED and resumes with an explicit rerun.
//!
//! Store access runs on the blocking pool through [`run_blocking`].

mod housekeeping;
mod retention;

pub use housekeeping::{HousekeepingReport, Housekeeper};
pub use retention::RetentionPolicy;

use crate::config::{
    ConfigFile, DEFAULT_HOUSEKEEPING_EVERY, DEFAULT_MAX_CONCURRENT_REQUESTS,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RETENTION_DAYS,
};
use crate::log::Logger;
use crate::model::ProcessOwner;
use crate::processor::{ProcessRegistration, ProcessorConfig, RequestProcessor};
use crate::retriever::{RetrieverConfig, RetrieverRegistry};
use crate::state::{OsProcessTable, ProcessLiveness, StateInspector};
use crate::store::{run_blocking, StateStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the job daemon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Global cap on RUNNING requests.
    pub max_concurrent_requests: usize,
    pub poll_interval: Duration,
    /// Housekeeping cadence in loop iterations. `0` disables periodic
    /// sweeps (the startup sweep still runs).
    pub housekeeping_every: u32,
    /// Age after which finished requests are purged. `0` keeps them forever.
    pub retention_days: u32,
    pub processor: ProcessorConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            housekeeping_every: DEFAULT_HOUSEKEEPING_EVERY,
            retention_days: DEFAULT_RETENTION_DAYS,
            processor: ProcessorConfig::default(),
        }
    }
}

impl From<&ConfigFile> for DaemonConfig {
    fn from(config: &ConfigFile) -> Self {
        Self {
            max_concurrent_requests: config.daemon.max_concurrent_requests,
            poll_interval: Duration::from_secs(config.daemon.poll_interval_secs),
            housekeeping_every: config.daemon.housekeeping_every,
            retention_days: config.daemon.retention_days,
            processor: ProcessorConfig {
                retrievers: RetrieverConfig::from(config),
                max_running: config.distributor.max_running,
            },
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that stop the daemon from starting.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Another daemon with a live pid is registered in the same store.
    #[error("a job daemon is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters reported when the daemon stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DaemonSummary {
    pub iterations: u64,
    pub spawned: usize,
    pub reaped: usize,
    pub purged: usize,
}

// =============================================================================
// Daemon
// =============================================================================

/// Long-running request scheduler.
#[derive(Clone)]
pub struct JobDaemon {
    store: Arc<dyn StateStore>,
    registry: Arc<RetrieverRegistry>,
    config: DaemonConfig,
    logger: Arc<dyn Logger>,
    liveness: Arc<dyn ProcessLiveness>,
}

impl JobDaemon {
    pub fn new(
        store: Arc<dyn StateStore>,
        registry: Arc<RetrieverRegistry>,
        config: DaemonConfig,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            logger,
            liveness: Arc::new(OsProcessTable::new()),
        }
    }

    /// Replaces the process-table lookup used by housekeeping.
    pub fn with_liveness(mut self, liveness: Arc<dyn ProcessLiveness>) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<DaemonSummary, DaemonError> {
        let mut summary = DaemonSummary::default();

        let startup = self.blocking(|daemon| daemon.housekeep()).await?;
        summary.reaped += startup.0;
        summary.purged += startup.1;

        let store = Arc::clone(&self.store);
        if let Some(other) = run_blocking(move || store.processes())
            .await?
            .into_iter()
            .find(|p| p.owner == ProcessOwner::Daemon)
        {
            return Err(DaemonError::AlreadyRunning { pid: other.pid });
        }
        let mut registration =
            ProcessRegistration::register(Arc::clone(&self.store), ProcessOwner::Daemon, None)?;

        info!(
            record = %registration.id(),
            max_concurrent_requests = self.config.max_concurrent_requests,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            housekeeping_every = self.config.housekeeping_every,
            "Job daemon started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Job daemon shutting down");
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Request task ended abnormally");
                    }
                    continue;
                }

                _ = ticker.tick() => {}
            }

            summary.iterations += 1;

            match self.blocking(|daemon| daemon.claim()).await {
                Ok(claimed) => {
                    for processor in claimed {
                        summary.spawned += 1;
                        tasks.spawn(Self::drive(processor));
                    }
                }
                Err(e) => error!(error = %e, "Failed to claim pending requests"),
            }

            let every = u64::from(self.config.housekeeping_every);
            if every > 0 && summary.iterations % every == 0 {
                match self.blocking(|daemon| daemon.housekeep()).await {
                    Ok((reaped, purged)) => {
                        summary.reaped += reaped;
                        summary.purged += purged;
                    }
                    Err(e) => error!(error = %e, "Housekeeping failed"),
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Leaving in-flight requests running");
        }
        tasks.detach_all();

        if let Err(e) = registration.release() {
            warn!(error = %e, "Failed to deregister daemon record");
        }
        info!(
            iterations = summary.iterations,
            spawned = summary.spawned,
            "Job daemon stopped"
        );
        Ok(summary)
    }

    /// Claims up to the free capacity of pending requests, oldest first.
    ///
    /// Each returned processor has already registered its process record and
    /// set `started`, so the next poll will not claim the same request.
    pub fn claim(&self) -> Result<Vec<Arc<RequestProcessor>>, StoreError> {
        let live = self
            .store
            .processes()?
            .iter()
            .filter(|p| matches!(p.owner, ProcessOwner::Request(_)))
            .count();
        let capacity = self.config.max_concurrent_requests.saturating_sub(live);
        if capacity == 0 {
            debug!(live, "At request capacity");
            return Ok(Vec::new());
        }

        let mut claimed = Vec::new();
        for request in self.store.pending_requests(capacity)? {
            let processor = Arc::new(RequestProcessor::new(
                request.id,
                Arc::clone(&self.store),
                Arc::clone(&self.registry),
                self.config.processor.clone(),
                Arc::clone(&self.logger),
            ));
            match processor.begin() {
                Ok(_) => {
                    debug!(request = %request.id, name = %request.name, "Claimed request");
                    claimed.push(processor);
                }
                Err(e) => warn!(request = %request.id, error = %e, "Could not claim request"),
            }
        }
        Ok(claimed)
    }

    /// Runs housekeeping and retention. Returns (records reaped, requests purged).
    pub fn housekeep(&self) -> Result<(usize, usize), StoreError> {
        let report = Housekeeper::new(Arc::clone(&self.store)).sweep(self.liveness.as_ref())?;
        let retention = RetentionPolicy::new(
            Arc::clone(&self.store),
            StateInspector::new(Arc::clone(&self.store)),
            self.config.retention_days,
        );
        let purged = retention.purge(Utc::now())?;
        Ok((report.reaped.len(), purged.len()))
    }

    /// Runs `op` against a handle to this daemon on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&JobDaemon) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let daemon = self.clone();
        run_blocking(move || op(&daemon)).await
    }

    async fn drive(processor: Arc<RequestProcessor>) {
        let id = processor.id();
        match processor.run().await {
            Ok(_) => info!(request = %id, "Request complete"),
            Err(e) => error!(request = %id, error = %e, "Request failed"),
        }
    }
}

impl std::fmt::Debug for JobDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDaemon")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NoOpLogger;
    use crate::model::NewRequest;
    use crate::store::MemoryStateStore;

    fn daemon(store: Arc<dyn StateStore>, max: usize) -> JobDaemon {
        let config = DaemonConfig {
            max_concurrent_requests: max,
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        JobDaemon::new(
            store,
            Arc::new(RetrieverRegistry::with_defaults()),
            config,
            Arc::new(NoOpLogger),
        )
    }

    #[test]
    fn test_claim_respects_capacity_and_order() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let ids: Vec<_> = (0..3)
            .map(|i| {
                store
                    .create_request(NewRequest::new(format!("r{}", i), "local", "/out"))
                    .unwrap()
                    .id
            })
            .collect();
        let daemon = daemon(store.clone(), 2);

        let first = daemon.claim().unwrap();
        assert_eq!(
            first.iter().map(|p| p.id()).collect::<Vec<_>>(),
            vec![ids[0], ids[1]]
        );
        // Both claimed requests hold records, so no capacity remains.
        assert!(daemon.claim().unwrap().is_empty());

        first[0].clean_up();
        let second = daemon.claim().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id(), ids[2]);
    }

    #[tokio::test]
    async fn test_refuses_second_live_daemon() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        store
            .register_process(ProcessOwner::Daemon, crate::model::current_pid(), None)
            .unwrap();

        let err = daemon(store, 1)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::AlreadyRunning { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_deregisters_own_record() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(daemon(store.clone(), 1).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store
            .processes()
            .unwrap()
            .iter()
            .any(|p| p.owner == ProcessOwner::Daemon));

        shutdown.cancel();
        let summary = handle.await.unwrap().unwrap();
        assert!(summary.iterations >= 1);
        assert!(store.processes().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_startup_reaps_stale_daemon_record() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        store
            .register_process(ProcessOwner::Daemon, 999_999, None)
            .unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = daemon(store.clone(), 1)
            .with_liveness(Arc::new(|pid: u32| pid != 999_999))
            .run(shutdown)
            .await
            .unwrap();

        assert_eq!(summary.reaped, 1);
        assert!(store.processes().unwrap().is_empty());
    }
}
