//! geoharvest - orchestration engine for satellite imagery retrieval
//!
//! A user submits a [`Request`](model::Request) describing what to retrieve.
//! A pluggable [`Retriever`](retriever::Retriever) decomposes it into
//! constituents, each an independently produced output artifact. The engine
//! runs the constituents under a concurrency ceiling, tracks liveness with
//! process records, and derives PENDING / RUNNING / COMPLETE / FAILED state
//! on demand.
//!
//! # Components
//!
//! ```text
//!  JobDaemon ──► RequestProcessor ──► Distributor ──► ConstituentProcessor
//!      │               │                                     │
//!      │               └──── RetrieverRegistry ──► Retriever ┘
//!      │
//!      └──► Housekeeper (reap dead process records) ──► RetentionPolicy
//!
//!  StateStore: requests, constituents, process records
//!  StateInspector: derived state from store + filesystem
//! ```
//!
//! # Example
//!
//! ```no_run
//! use geoharvest::log::TracingLogger;
//! use geoharvest::model::NewRequest;
//! use geoharvest::processor::{ProcessorConfig, RequestProcessor};
//! use geoharvest::retriever::RetrieverRegistry;
//! use geoharvest::store::{MemoryStateStore, StateStore};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
//! let request = store.create_request(
//!     NewRequest::new("scenes", "local", "/data/out")
//!         .with_parameters(json!({ "inputs": ["/data/raw/a.tif", "/data/raw/b.tif"] })),
//! )?;
//!
//! let processor = RequestProcessor::new(
//!     request.id,
//!     store,
//!     Arc::new(RetrieverRegistry::with_defaults()),
//!     ProcessorConfig::default(),
//!     Arc::new(TracingLogger),
//! );
//! processor.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod daemon;
pub mod distributor;
pub mod log;
pub mod logging;
pub mod model;
pub mod processor;
pub mod retriever;
pub mod retrievers;
pub mod state;
pub mod store;

/// Version of the geoharvest library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
