//! Configuration for the job daemon, retrievers and logging.
//!
//! User settings live in `~/.geoharvest/config.ini`:
//!
//! ```ini
//! [daemon]
//! max_concurrent_requests = 4
//! poll_interval_secs = 5
//! housekeeping_every = 12
//! retention_days = 0
//!
//! [distributor]
//! max_running = 0
//!
//! [store]
//! path = ~/.geoharvest/state.json
//!
//! [retrievers]
//! output_root = ~/.geoharvest/output
//! max_constituents = 0
//! command_max_concurrency = 0
//!
//! [logging]
//! file = ~/.geoharvest/geoharvest.log
//! ```
//!
//! Settings structs live in [`settings`], constants in [`defaults`], parsing
//! in `parser` and serialization in `writer`. Components never read the file
//! themselves; they receive explicit config structs built with `From<&ConfigFile>`.
//!
//! ```
//! use geoharvest::config::ConfigFile;
//! use geoharvest::daemon::DaemonConfig;
//!
//! let config = ConfigFile::default();
//! let daemon = DaemonConfig::from(&config);
//! assert_eq!(daemon.max_concurrent_requests, 4);
//! ```

pub mod defaults;
mod file;
mod parser;
pub mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, DaemonSettings, DistributorSettings, LoggingSettings, RetrieverSettings,
    StoreSettings,
};
