//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization, and state store
//! access to reduce duplication across command handlers.

use crate::error::CliError;
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use geoharvest::config::ConfigFile;
use geoharvest::log::{Logger, TracingLogger};
use geoharvest::logging::{init_logging_at, LoggingGuard};
use geoharvest::retriever::RetrieverRegistry;
use geoharvest::store::{FileStateStore, StateStore};

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    store: Arc<dyn StateStore>,
}

impl CliRunner {
    /// Create a new CLI runner, loading config, initializing logging and
    /// opening the state store named in the config.
    ///
    /// # Arguments
    ///
    /// * `debug_mode` - When true, enables debug-level logging unless RUST_LOG is set
    pub fn with_debug(debug_mode: bool) -> Result<Self, CliError> {
        // Load config file (or use defaults if not present)
        let config = ConfigFile::load()?;

        let logging_guard = init_logging_at(&config.logging.file, debug_mode)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let store = FileStateStore::open(&config.store.path)?;
        info!(path = %store.path().display(), "Opened state store");

        Ok(Self {
            logging_guard,
            config,
            store: Arc::new(store),
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Retriever registry with the built-in protocols.
    pub fn registry(&self) -> Arc<RetrieverRegistry> {
        Arc::new(RetrieverRegistry::with_defaults())
    }

    /// Logger handed to processors; delegates to `tracing`.
    pub fn logger(&self) -> Arc<dyn Logger> {
        Arc::new(TracingLogger)
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("geoharvest v{}", geoharvest::VERSION);
        info!("geoharvest CLI: {} command", command);
    }

    /// Drive a future to completion on a fresh multi-threaded runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, CliError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;
        Ok(runtime.block_on(future))
    }
}
