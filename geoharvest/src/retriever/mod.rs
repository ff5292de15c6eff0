//! Retriever plug-in contract.
//!
//! A [`Retriever`] knows how to decompose one request into constituents and
//! how to produce each of them. The orchestration core treats every
//! implementation uniformly; new data sources are added by registering a
//! factory in the [`RetrieverRegistry`], never by touching the processors.
//!
//! # Contract
//!
//! ```text
//! list_constituents()            -> { destination path -> [input refs] }
//! retrieve_one(key, inputs)      -> final destination path   (idempotent)
//! aggregate(outputs)             -> Option<final artifact>    (optional)
//! max_concurrency()              -> cap honoured by the distributor
//! ```
//!
//! - Listing must be resumable: a persisted constituent list from an earlier
//!   run is reused instead of re-querying the source
//!   ([`support::load_or_plan`]).
//! - `retrieve_one` returns immediately when the destination already exists,
//!   and never leaves a partial file at the real destination path
//!   ([`support::publish`]).
//! - Shared helpers are free functions in [`support`], not a base type.

mod registry;
pub mod support;

pub use registry::{RetrieverFactory, RetrieverRegistry};

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;

/// Mapping of constituent destination path to the raw inputs that build it.
pub type ConstituentMap = BTreeMap<PathBuf, Vec<String>>;

/// Boxed future returned by retriever operations.
pub type RetrieverFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RetrieverError>> + Send + 'a>>;

/// Concurrency value meaning "no cap".
pub const UNBOUNDED: usize = usize::MAX;

/// Errors raised by retrievers and the registry.
#[derive(Debug, Error)]
pub enum RetrieverError {
    /// No retriever is registered for the request's protocol.
    #[error("no retriever registered for protocol '{0}'")]
    UnknownProtocol(String),

    /// Request parameters are missing or malformed.
    #[error("invalid request parameters: {0}")]
    InvalidParameters(String),

    /// The data source (or an input) could not be reached.
    #[error("data source unreachable: {0}")]
    Unreachable(String),

    /// The decomposition exceeds the configured maximum.
    #[error("request decomposes into {count} constituents, maximum is {max}")]
    TooManyConstituents { count: usize, max: usize },

    /// An external tool exited unsuccessfully.
    #[error("{tool} failed (exit status {status:?}): {stderr}")]
    ToolFailed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("retriever I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("retriever serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pluggable strategy for one data source.
///
/// Implementations are shared across concurrently running constituent
/// workers, so all methods take `&self`.
pub trait Retriever: Send + Sync + 'static {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Maximum number of constituents the source tolerates in flight.
    ///
    /// Sources that cannot handle concurrent access (a single FTP session,
    /// a licence-limited tool) return 1.
    fn max_concurrency(&self) -> usize {
        UNBOUNDED
    }

    /// Decomposes the request into constituents.
    fn list_constituents(&self) -> RetrieverFuture<'_, ConstituentMap>;

    /// Produces one constituent and returns its final path.
    fn retrieve_one<'a>(&'a self, key: &'a Path, inputs: &'a [String])
        -> RetrieverFuture<'a, PathBuf>;

    /// Combines all constituent outputs into a final artifact.
    ///
    /// The default has no aggregation phase.
    fn aggregate<'a>(&'a self, _outputs: &'a [PathBuf]) -> RetrieverFuture<'a, Option<PathBuf>> {
        Box::pin(async { Ok(None) })
    }
}

/// Settings passed explicitly to every retriever factory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrieverConfig {
    /// Root under which relative request destinations are resolved.
    pub output_root: PathBuf,
    /// Upper bound on constituents per request. `0` disables the check.
    pub max_constituents: usize,
    /// Cap on concurrent external tool invocations per request. `0` = no cap.
    pub command_max_concurrency: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            max_constituents: 0,
            command_max_concurrency: 0,
        }
    }
}

impl From<&crate::config::ConfigFile> for RetrieverConfig {
    fn from(config: &crate::config::ConfigFile) -> Self {
        Self {
            output_root: config.retrievers.output_root.clone(),
            max_constituents: config.retrievers.max_constituents,
            command_max_concurrency: config.retrievers.command_max_concurrency,
        }
    }
}

impl RetrieverConfig {
    /// Resolves a request destination against the output root.
    pub fn resolve_destination(&self, destination: &Path) -> PathBuf {
        if destination.is_absolute() {
            destination.to_path_buf()
        } else {
            self.output_root.join(destination)
        }
    }
}
