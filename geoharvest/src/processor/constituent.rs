//! Crash-safe execution of a single constituent.

use super::{ProcessRegistration, ProcessorError};
use crate::distributor::ErrorChannel;
use crate::log::ScopedLogger;
use crate::model::{Constituent, ConstituentId, ProcessId, ProcessOwner, RequestId};
use crate::retriever::Retriever;
use crate::store::{run_blocking, StateStore};
use crate::{log_debug, log_error, log_info, log_warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Produces one constituent through its retriever.
///
/// [`run`](Self::run) never returns an error. Every failure is logged and
/// sent to the batch's [`ErrorChannel`]; the caller learns about it from
/// the channel and from the constituent's derived state.
pub struct ConstituentProcessor {
    constituent: Constituent,
    retriever: Arc<dyn Retriever>,
    parent: Option<ProcessId>,
    store: Arc<dyn StateStore>,
    logger: ScopedLogger,
}

impl ConstituentProcessor {
    /// Creates a processor for `constituent`.
    ///
    /// `parent` is the owning request's process record; removing it also
    /// removes this processor's record. Log lines are scoped under the
    /// request's `logger`.
    pub fn new(
        constituent: Constituent,
        retriever: Arc<dyn Retriever>,
        parent: Option<ProcessId>,
        store: Arc<dyn StateStore>,
        logger: &ScopedLogger,
    ) -> Self {
        let scope = constituent
            .key
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| constituent.id.to_string());
        Self {
            logger: logger.nested(scope),
            constituent,
            retriever,
            parent,
            store,
        }
    }

    pub fn id(&self) -> ConstituentId {
        self.constituent.id
    }

    pub fn request(&self) -> RequestId {
        self.constituent.request
    }

    pub fn key(&self) -> &Path {
        &self.constituent.key
    }

    pub fn inputs(&self) -> &[String] {
        &self.constituent.inputs
    }

    /// Runs the constituent to completion or failure.
    pub async fn run(&self, errors: &ErrorChannel) {
        if self.already_complete() {
            log_debug!(self.logger, "already complete, skipping");
            return;
        }

        let mut registration = match ProcessRegistration::register(
            Arc::clone(&self.store),
            ProcessOwner::Constituent(self.constituent.id),
            self.parent,
        ) {
            Ok(registration) => registration,
            Err(e) => {
                log_error!(self.logger, "could not register process record: {}", e);
                errors.report(self.key(), e.to_string());
                return;
            }
        };

        match self.attempt().await {
            Ok(destination) => {
                log_info!(self.logger, "produced {}", destination.display());
            }
            Err(e) => {
                log_error!(self.logger, "failed: {}", e);
                errors.report(self.key(), e.to_string());
            }
        }

        if let Err(e) = registration.release() {
            log_warn!(self.logger, "could not deregister process record: {}", e);
        }
        self.verify();
    }

    async fn attempt(&self) -> Result<PathBuf, ProcessorError> {
        let id = self.constituent.id;
        let store = Arc::clone(&self.store);
        run_blocking(move || store.mark_constituent_started(id)).await?;

        let destination = self
            .retriever
            .retrieve_one(&self.constituent.key, &self.constituent.inputs)
            .await?;

        let store = Arc::clone(&self.store);
        let recorded = destination.clone();
        run_blocking(move || store.set_constituent_destination(id, recorded)).await?;
        Ok(destination)
    }

    /// Re-reads the constituent and logs a diagnostic if it has no valid
    /// destination. Observational only; never changes state.
    ///
    /// Returns true when the destination is set and exists.
    pub fn verify(&self) -> bool {
        match self.store.constituent(self.constituent.id) {
            Ok(Some(current)) => match current.destination {
                Some(path) if path.exists() => true,
                Some(path) => {
                    log_warn!(
                        self.logger,
                        "destination {} is recorded but missing on disk",
                        path.display()
                    );
                    false
                }
                None => {
                    log_warn!(self.logger, "finished without a destination");
                    false
                }
            },
            Ok(None) => {
                log_warn!(self.logger, "record no longer exists");
                false
            }
            Err(e) => {
                log_warn!(self.logger, "could not re-read record: {}", e);
                false
            }
        }
    }

    fn already_complete(&self) -> bool {
        matches!(
            self.store.constituent(self.constituent.id),
            Ok(Some(Constituent { destination: Some(ref path), .. })) if path.exists()
        )
    }
}

impl std::fmt::Debug for ConstituentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstituentProcessor")
            .field("constituent", &self.constituent.id)
            .field("key", &self.constituent.key)
            .field("retriever", &self.retriever.name())
            .field("parent", &self.parent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLogger;
    use crate::model::NewRequest;
    use crate::retrievers::LocalCopyRetriever;
    use crate::retriever::RetrieverConfig;
    use crate::state::{ProcessState, StateInspector};
    use crate::store::MemoryStateStore;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: Arc<dyn StateStore>,
        logger: Arc<MemoryLogger>,
        retriever: Arc<dyn Retriever>,
        request: RequestId,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let request = store
            .create_request(
                NewRequest::new("one", "local", dir.path().join("out"))
                    .with_parameters(json!({ "inputs": [] })),
            )
            .unwrap();
        let retriever: Arc<dyn Retriever> =
            Arc::new(LocalCopyRetriever::new(&request, &RetrieverConfig::default()).unwrap());
        Fixture {
            dir,
            store,
            logger: Arc::new(MemoryLogger::new()),
            retriever,
            request: request.id,
        }
    }

    impl Fixture {
        fn processor(&self, name: &str, inputs: Vec<String>) -> ConstituentProcessor {
            let constituent = self
                .store
                .ensure_constituent(self.request, self.dir.path().join("out").join(name), inputs)
                .unwrap();
            ConstituentProcessor::new(
                constituent,
                Arc::clone(&self.retriever),
                None,
                Arc::clone(&self.store),
                &ScopedLogger::new(self.logger.clone(), self.request.to_string()),
            )
        }

        fn input(&self, name: &str, body: &str) -> String {
            let path = self.dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            path.to_string_lossy().into_owned()
        }
    }

    #[tokio::test]
    async fn test_success_sets_destination_and_releases_record() {
        let fx = fixture();
        let input = fx.input("in1.tif", "pixels");
        let processor = fx.processor("a.tif", vec![input]);
        let (errors, mut receiver) = ErrorChannel::new();

        processor.run(&errors).await;

        assert!(receiver.drain().is_empty());
        let record = fx.store.constituent(processor.id()).unwrap().unwrap();
        assert!(record.started);
        assert_eq!(record.destination.as_deref(), Some(processor.key()));
        assert!(fx.store.processes().unwrap().is_empty());

        let inspector = StateInspector::new(fx.store.clone());
        assert_eq!(inspector.constituent_state(&record), ProcessState::Complete);
        assert!(fx.logger.contains("produced"));
    }

    #[tokio::test]
    async fn test_failure_is_signalled_not_raised() {
        let fx = fixture();
        let missing = fx.dir.path().join("absent.tif").to_string_lossy().into_owned();
        let processor = fx.processor("b.tif", vec![missing]);
        let (errors, mut receiver) = ErrorChannel::new();

        processor.run(&errors).await;

        let failures = receiver.drain();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key, processor.key());

        let record = fx.store.constituent(processor.id()).unwrap().unwrap();
        assert!(record.started);
        assert!(record.destination.is_none());
        assert!(fx.store.processes().unwrap().is_empty());

        // Verification after deregistration reports the missing destination.
        assert!(fx.logger.contains("finished without a destination"));
        assert!(!processor.verify());
    }

    #[tokio::test]
    async fn test_completed_constituent_is_skipped() {
        let fx = fixture();
        let input = fx.input("in1.tif", "pixels");
        let processor = fx.processor("a.tif", vec![input]);
        let (errors, _receiver) = ErrorChannel::new();

        processor.run(&errors).await;
        let lines_after_first = fx.logger.lines().len();
        processor.run(&errors).await;

        assert!(fx.logger.contains("already complete"));
        assert_eq!(fx.logger.lines().len(), lines_after_first + 1);
    }

    #[tokio::test]
    async fn test_live_record_blocks_second_worker() {
        let fx = fixture();
        let input = fx.input("in1.tif", "pixels");
        let processor = fx.processor("a.tif", vec![input]);
        let _held = ProcessRegistration::register(
            fx.store.clone(),
            ProcessOwner::Constituent(processor.id()),
            None,
        )
        .unwrap();
        let (errors, mut receiver) = ErrorChannel::new();

        processor.run(&errors).await;

        assert_eq!(receiver.drain().len(), 1);
        assert!(!processor.key().exists());
        assert_eq!(fx.store.processes().unwrap().len(), 1);
    }

    #[test]
    fn test_scope_nests_under_request() {
        let fx = fixture();
        let processor = fx.processor("scene.tif", vec![]);
        assert_eq!(
            processor.logger.scope(),
            format!("{}/scene.tif", fx.request)
        );
        assert_eq!(processor.request(), fx.request);
        assert!(processor.inputs().is_empty());
    }
}
