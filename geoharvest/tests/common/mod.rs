//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use geoharvest::model::{NewRequest, Request};
use geoharvest::retriever::{
    ConstituentMap, Retriever, RetrieverError, RetrieverFuture, RetrieverRegistry, UNBOUNDED,
};
use geoharvest::store::StateStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Protocol name the scripted retriever is registered under.
pub const SCRIPTED: &str = "scripted";

/// Behaviour shared by every retriever built from one registry.
///
/// Constituent names are file names under the request destination. Names in
/// `failing` raise `Unreachable`; every other name writes its inputs to the
/// key path. With an aggregate name set, aggregation writes the sorted
/// output list to that file unless `aggregate_fails` is raised.
pub struct Script {
    plan: Vec<(String, Vec<String>)>,
    failing: Mutex<HashSet<String>>,
    max_concurrency: usize,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
    aggregate_name: Option<String>,
    aggregate_fails: AtomicBool,
    aggregate_calls: AtomicUsize,
}

impl Script {
    pub fn new(plan: &[(&str, &str)]) -> Self {
        Self {
            plan: plan
                .iter()
                .map(|(name, input)| (name.to_string(), vec![input.to_string()]))
                .collect(),
            failing: Mutex::new(HashSet::new()),
            max_concurrency: UNBOUNDED,
            delay: Duration::from_millis(25),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            aggregate_name: None,
            aggregate_fails: AtomicBool::new(false),
            aggregate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_aggregate(mut self, name: &str) -> Self {
        self.aggregate_name = Some(name.to_string());
        self
    }

    pub fn failing_aggregate(self) -> Self {
        self.aggregate_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn heal_aggregate(&self) {
        self.aggregate_fails.store(false, Ordering::SeqCst);
    }

    pub fn aggregate_calls(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn failing(self, name: &str) -> Self {
        self.failing.lock().insert(name.to_string());
        self
    }

    /// Lets a previously failing constituent succeed.
    pub fn heal(&self, name: &str) {
        self.failing.lock().remove(name);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of `retrieve_one` calls for `name`.
    pub fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Registry with this script under [`SCRIPTED`] plus the built-ins.
    pub fn registry(self: &Arc<Self>) -> Arc<RetrieverRegistry> {
        let script = Arc::clone(self);
        Arc::new(
            RetrieverRegistry::with_defaults().with(SCRIPTED, move |request, config| {
                Ok(Arc::new(ScriptedRetriever {
                    destination: config.resolve_destination(&request.destination),
                    script: Arc::clone(&script),
                }) as Arc<dyn Retriever>)
            }),
        )
    }
}

struct ScriptedRetriever {
    destination: PathBuf,
    script: Arc<Script>,
}

impl Retriever for ScriptedRetriever {
    fn name(&self) -> &str {
        SCRIPTED
    }

    fn max_concurrency(&self) -> usize {
        self.script.max_concurrency
    }

    fn list_constituents(&self) -> RetrieverFuture<'_, ConstituentMap> {
        Box::pin(async move {
            Ok(self
                .script
                .plan
                .iter()
                .map(|(name, inputs)| (self.destination.join(name), inputs.clone()))
                .collect())
        })
    }

    fn retrieve_one<'a>(
        &'a self,
        key: &'a Path,
        inputs: &'a [String],
    ) -> RetrieverFuture<'a, PathBuf> {
        Box::pin(async move {
            let name = key
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let now = self.script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.script.peak.fetch_max(now, Ordering::SeqCst);
            self.script.calls.lock().push(name.clone());

            tokio::time::sleep(self.script.delay).await;

            let offline = self.script.failing.lock().contains(&name);
            let result = if offline {
                Err(RetrieverError::Unreachable(format!("{} is offline", name)))
            } else {
                write(key, &inputs.join(",")).await
            };
            self.script.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn aggregate<'a>(&'a self, outputs: &'a [PathBuf]) -> RetrieverFuture<'a, Option<PathBuf>> {
        Box::pin(async move {
            let Some(name) = &self.script.aggregate_name else {
                return Ok(None);
            };
            self.script.aggregate_calls.fetch_add(1, Ordering::SeqCst);
            if self.script.aggregate_fails.load(Ordering::SeqCst) {
                return Err(RetrieverError::ToolFailed {
                    tool: "mosaic".into(),
                    status: Some(1),
                    stderr: "out of memory".into(),
                });
            }
            let listing: Vec<String> = outputs
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            write(&self.destination.join(name), &listing.join("\n"))
                .await
                .map(Some)
        })
    }
}

async fn write(key: &Path, body: &str) -> Result<PathBuf, RetrieverError> {
    if let Some(parent) = key.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(key, body).await?;
    Ok(key.to_path_buf())
}

/// Creates an unstarted request for the scripted protocol.
pub fn submit(store: &Arc<dyn StateStore>, destination: &Path, concurrency: usize) -> Request {
    store
        .create_request(
            NewRequest::new("integration", SCRIPTED, destination).with_concurrency(concurrency),
        )
        .unwrap()
}
