//! Protocol name → retriever factory lookup.

use super::{Retriever, RetrieverConfig, RetrieverError};
use crate::model::Request;
use crate::retrievers::{CommandRetriever, LocalCopyRetriever};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a retriever for one request.
pub type RetrieverFactory = Arc<
    dyn Fn(&Request, &RetrieverConfig) -> Result<Arc<dyn Retriever>, RetrieverError>
        + Send
        + Sync,
>;

/// Maps protocol names (case-insensitive) to retriever factories.
#[derive(Clone, Default)]
pub struct RetrieverRegistry {
    factories: BTreeMap<String, RetrieverFactory>,
}

impl RetrieverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in protocols (`local`, `command`).
    pub fn with_defaults() -> Self {
        Self::new()
            .with(LocalCopyRetriever::PROTOCOL, |request, config| {
                Ok(Arc::new(LocalCopyRetriever::new(request, config)?) as Arc<dyn Retriever>)
            })
            .with(CommandRetriever::PROTOCOL, |request, config| {
                Ok(Arc::new(CommandRetriever::new(request, config)?) as Arc<dyn Retriever>)
            })
    }

    /// Registers (or replaces) the factory for `protocol`.
    pub fn register<F>(&mut self, protocol: impl AsRef<str>, factory: F)
    where
        F: Fn(&Request, &RetrieverConfig) -> Result<Arc<dyn Retriever>, RetrieverError>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .insert(protocol.as_ref().to_lowercase(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, protocol: impl AsRef<str>, factory: F) -> Self
    where
        F: Fn(&Request, &RetrieverConfig) -> Result<Arc<dyn Retriever>, RetrieverError>
            + Send
            + Sync
            + 'static,
    {
        self.register(protocol, factory);
        self
    }

    /// Builds the retriever for a request's protocol.
    pub fn resolve(
        &self,
        request: &Request,
        config: &RetrieverConfig,
    ) -> Result<Arc<dyn Retriever>, RetrieverError> {
        let factory = self
            .factories
            .get(&request.protocol.to_lowercase())
            .ok_or_else(|| RetrieverError::UnknownProtocol(request.protocol.clone()))?;
        factory(request, config)
    }

    /// Returns the registered protocol names, sorted.
    pub fn protocols(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, protocol: &str) -> bool {
        self.factories.contains_key(&protocol.to_lowercase())
    }
}

impl fmt::Debug for RetrieverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrieverRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}
